use super::MaintenanceError;
use chrono::NaiveDate;
use std::sync::Arc;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceForm {
    pub equipment_tag: String,
    pub date: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentTag(String);

impl EquipmentTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The configured equipment enumeration; tags outside it are never submitted.
#[derive(Debug, Clone)]
pub struct EquipmentCatalog {
    tags: Arc<[String]>,
}

impl EquipmentCatalog {
    pub fn new(tags: &[String]) -> Self {
        Self {
            tags: tags.iter().cloned().collect(),
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn resolve(&self, raw: &str) -> Option<EquipmentTag> {
        let raw = raw.trim();
        self.tags
            .iter()
            .find(|tag| tag.as_str() == raw)
            .map(|tag| EquipmentTag(tag.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    tag: EquipmentTag,
    date: NaiveDate,
    description: String,
}

impl ValidatedSubmission {
    pub fn tag(&self) -> &EquipmentTag {
        &self.tag
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl MaintenanceForm {
    /// Purely local; nothing is sent anywhere when this fails.
    pub fn validate(&self, catalog: &EquipmentCatalog) -> Result<ValidatedSubmission, MaintenanceError> {
        let equipment_tag = self.equipment_tag.trim();
        let date = self.date.trim();
        let description = self.description.trim();

        let missing: Vec<&str> = [
            ("equipment_tag", equipment_tag),
            ("date", date),
            ("description", description),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(MaintenanceError::ValidationFailed(format!(
                "required fields are empty: {}",
                missing.join(", ")
            )));
        }

        let tag = catalog.resolve(equipment_tag).ok_or_else(|| {
            MaintenanceError::ValidationFailed(format!("unknown equipment tag {equipment_tag:?}"))
        })?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|err| {
            MaintenanceError::ValidationFailed(format!("date {date:?} is not YYYY-MM-DD: {err}"))
        })?;

        Ok(ValidatedSubmission {
            tag,
            date,
            description: description.to_string(),
        })
    }
}
