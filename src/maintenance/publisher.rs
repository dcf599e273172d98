use super::{EquipmentCatalog, ExternalId, MaintenanceError, MaintenanceForm, RecordStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct MaintenancePublisher {
    store: Arc<dyn RecordStore>,
    catalog: EquipmentCatalog,
}

impl MaintenancePublisher {
    pub fn new(store: Arc<dyn RecordStore>, catalog: EquipmentCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &EquipmentCatalog {
        &self.catalog
    }

    /// Create-then-publish. Only a completed publish counts; a failed call may be retried
    /// whole, since an unpublished draft is invisible to readers.
    pub async fn publish(&self, form: &MaintenanceForm) -> Result<ExternalId, MaintenanceError> {
        let submission = form.validate(&self.catalog)?;

        let draft = match self.store.create_draft(&submission).await {
            Ok(draft) => draft,
            Err(err) => {
                tracing::warn!(
                    equipment = submission.tag().as_str(),
                    error = %err,
                    "failed to create maintenance draft"
                );
                return Err(err.into());
            }
        };

        if let Err(err) = self.store.publish_draft(&draft).await {
            tracing::warn!(
                draft_id = %draft.id,
                draft_version = draft.version,
                error = %err,
                "maintenance draft left unpublished; reconcile it in the store"
            );
            return Err(err.into());
        }

        tracing::info!(
            external_id = %draft.id,
            equipment = submission.tag().as_str(),
            date = %submission.date(),
            "maintenance record published"
        );
        Ok(draft.id)
    }
}
