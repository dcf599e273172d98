use super::form::DATE_FORMAT;
use super::{ExternalId, MaintenanceError, MaintenanceEvent, RecordStore, StoredRecord};
use chrono::NaiveDate;
use std::sync::Arc;

/// Display form of the event list. On failure `events` is empty; nothing is cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceBoard {
    pub events: Vec<MaintenanceEvent>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct MaintenanceReader {
    store: Arc<dyn RecordStore>,
}

impl MaintenanceReader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Newest-created first, regardless of the order the store answered in.
    pub async fn list(&self) -> Result<Vec<MaintenanceEvent>, MaintenanceError> {
        let records = self
            .store
            .list_published()
            .await
            .map_err(|err| MaintenanceError::StoreUnavailable(err.to_string()))?;

        let mut events: Vec<MaintenanceEvent> = records.into_iter().filter_map(to_event).collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    pub async fn board(&self) -> MaintenanceBoard {
        match self.list().await {
            Ok(events) => MaintenanceBoard {
                events,
                error: None,
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to load maintenance records");
                MaintenanceBoard {
                    events: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

fn to_event(record: StoredRecord) -> Option<MaintenanceEvent> {
    let text = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let id = record.id;
    let (Some(created_at), Some(equipment_tag), Some(raw_date), Some(description)) = (
        record.created_at,
        text(record.equipment_tag),
        text(record.date),
        text(record.description),
    ) else {
        tracing::warn!(entry = %id, "skipping maintenance entry with missing fields");
        return None;
    };

    // Date fields may come back with a time part attached.
    let date_part = raw_date.split('T').next().unwrap_or_default();
    let Ok(date) = NaiveDate::parse_from_str(date_part, DATE_FORMAT) else {
        tracing::warn!(entry = %id, date = %raw_date, "skipping maintenance entry with invalid date");
        return None;
    };

    Some(MaintenanceEvent {
        external_id: ExternalId::new(id),
        equipment_tag,
        date,
        description,
        created_at,
    })
}
