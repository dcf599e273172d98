use crate::config::Config;
use crate::maintenance::{
    DraftRef, ExternalId, RecordStore, StoreError, StoredRecord, ValidatedSubmission, DATE_FORMAT,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

const MANAGEMENT_MEDIA_TYPE: &str = "application/vnd.contentful.management.v1+json";
const FIELD_EQUIPMENT: &str = "tipoEquipamento";
const FIELD_DATE: &str = "dataManutencao";
const FIELD_DESCRIPTION: &str = "descricaoManutencao";
const LIST_LIMIT: u32 = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Maintenance records in a Contentful space: drafts and publishing through the
/// management API, reads through the delivery API (which only serves published entries).
pub struct ContentfulStore {
    client: Client,
    delivery_url: String,
    management_url: String,
    space_id: String,
    environment: String,
    read_token: String,
    write_token: String,
    content_type: String,
    locale: String,
}

#[derive(Debug, Deserialize)]
struct EntrySys {
    id: String,
    #[serde(default)]
    version: Option<u64>,
    #[serde(rename = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EntryEnvelope {
    sys: EntrySys,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EntryCollection {
    #[serde(default)]
    items: Vec<EntryEnvelope>,
}

impl ContentfulStore {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Contentful HTTP client")?;
        Ok(Self {
            client,
            delivery_url: config.contentful_delivery_url.trim_end_matches('/').to_string(),
            management_url: config
                .contentful_management_url
                .trim_end_matches('/')
                .to_string(),
            space_id: config.contentful_space_id.clone(),
            environment: config.contentful_environment.clone(),
            read_token: config.contentful_read_token.clone(),
            write_token: config.contentful_write_token.clone(),
            content_type: config.contentful_content_type.clone(),
            locale: config.contentful_locale.clone(),
        })
    }

    fn entries_url(&self, base: &str) -> String {
        format!(
            "{base}/spaces/{}/environments/{}/entries",
            self.space_id, self.environment
        )
    }
}

#[async_trait]
impl RecordStore for ContentfulStore {
    async fn create_draft(&self, submission: &ValidatedSubmission) -> Result<DraftRef, StoreError> {
        let response = self
            .client
            .post(self.entries_url(&self.management_url))
            .bearer_auth(&self.write_token)
            .header(CONTENT_TYPE, MANAGEMENT_MEDIA_TYPE)
            .header("X-Contentful-Content-Type", &self.content_type)
            .body(draft_body(submission, &self.locale).to_string())
            .send()
            .await
            .map_err(transport_error)?;
        let body = checked(response).await?.bytes().await.map_err(transport_error)?;
        parse_draft(&body)
    }

    async fn publish_draft(&self, draft: &DraftRef) -> Result<(), StoreError> {
        let url = format!(
            "{}/{}/published",
            self.entries_url(&self.management_url),
            draft.id
        );
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.write_token)
            .header(CONTENT_TYPE, MANAGEMENT_MEDIA_TYPE)
            .header("X-Contentful-Version", draft.version.to_string())
            .send()
            .await
            .map_err(transport_error)?;
        checked(response).await?;
        Ok(())
    }

    async fn list_published(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let response = self
            .client
            .get(self.entries_url(&self.delivery_url))
            .bearer_auth(&self.read_token)
            .header(ACCEPT, "application/json")
            .query(&[
                ("content_type", self.content_type.as_str()),
                ("order", "-sys.createdAt"),
                ("limit", &LIST_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let body = checked(response).await?.bytes().await.map_err(transport_error)?;
        parse_entries(&body)
    }
}

/// Every field value is keyed by locale, e.g. `{"tipoEquipamento": {"en-US": "Sensor Norte"}}`.
pub fn draft_body(submission: &ValidatedSubmission, locale: &str) -> Value {
    json!({
        "fields": {
            FIELD_EQUIPMENT: { locale: submission.tag().as_str() },
            FIELD_DATE: { locale: submission.date().format(DATE_FORMAT).to_string() },
            FIELD_DESCRIPTION: { locale: submission.description() },
        }
    })
}

fn parse_draft(body: &[u8]) -> Result<DraftRef, StoreError> {
    let entry: EntryEnvelope = serde_json::from_slice(body)
        .map_err(|err| StoreError::Rejected(format!("unexpected create response: {err}")))?;
    Ok(DraftRef {
        id: ExternalId::new(entry.sys.id),
        version: entry.sys.version.unwrap_or(1),
    })
}

pub fn parse_entries(body: &[u8]) -> Result<Vec<StoredRecord>, StoreError> {
    let collection: EntryCollection = serde_json::from_slice(body)
        .map_err(|err| StoreError::Unavailable(format!("unexpected list response: {err}")))?;
    Ok(collection
        .items
        .into_iter()
        .map(|entry| {
            let text = |name: &str| {
                entry
                    .fields
                    .get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            StoredRecord {
                equipment_tag: text(FIELD_EQUIPMENT),
                date: text(FIELD_DATE),
                description: text(FIELD_DESCRIPTION),
                id: entry.sys.id,
                created_at: entry.sys.created_at,
            }
        })
        .collect())
}

async fn checked(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// 5xx and 429 mean the store may recover on retry; every other failure is a rejection.
pub fn status_error(status: StatusCode, body: &str) -> StoreError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty());
    let message = match detail {
        Some(detail) => format!("{status}: {detail}"),
        None => status.to_string(),
    };
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(message)
    } else {
        StoreError::Rejected(message)
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Unavailable("request to Contentful timed out".to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}
