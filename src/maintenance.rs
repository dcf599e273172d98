mod form;
mod publisher;
mod reader;


pub use form::{EquipmentCatalog, MaintenanceForm, ValidatedSubmission, DATE_FORMAT};
pub use publisher::MaintenancePublisher;
pub use reader::MaintenanceReader;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaintenanceError {
    #[error("invalid maintenance form: {0}")]
    ValidationFailed(String),
    #[error("maintenance store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("maintenance store rejected the record: {0}")]
    PublishRejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Rejected(String),
}

impl From<StoreError> for MaintenanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => MaintenanceError::StoreUnavailable(message),
            StoreError::Rejected(message) => MaintenanceError::PublishRejected(message),
        }
    }
}

/// Identifier assigned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A created but unpublished entry. Readers never see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRef {
    pub id: ExternalId,
    pub version: u64,
}

/// A published entry as the store returns it, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub equipment_tag: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceEvent {
    pub external_id: ExternalId,
    pub equipment_tag: String,
    pub date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn create_draft(&self, submission: &ValidatedSubmission) -> Result<DraftRef, StoreError>;

    async fn publish_draft(&self, draft: &DraftRef) -> Result<(), StoreError>;

    /// Published entries only.
    async fn list_published(&self) -> Result<Vec<StoredRecord>, StoreError>;
}
