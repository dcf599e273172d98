use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// Per-cycle failure. Each one leaves the previously published data in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error("telemetry fetch failed: {0}")]
    NetworkFailure(String),
    #[error("unexpected telemetry response: {0}")]
    MalformedEnvelope(String),
    #[error("no valid readings in response ({rejected} items rejected)")]
    EmptyResult { rejected: usize },
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::NetworkFailure(_) => "network_failure",
            CycleError::MalformedEnvelope(_) => "malformed_envelope",
            CycleError::EmptyResult { .. } => "empty_result",
        }
    }
}

#[async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Returns the raw `data` items of one well-formed envelope.
    async fn fetch_batch(&self) -> Result<Vec<Value>, CycleError>;
}

pub struct HttpTelemetrySource {
    client: Client,
    url: String,
    token: String,
    query: Vec<(&'static str, String)>,
}

impl HttpTelemetrySource {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .context("failed to build telemetry HTTP client")?;
        Ok(Self {
            client,
            url: config.telemetry_url.clone(),
            token: config.telemetry_token.clone(),
            query: vec![
                ("page", config.telemetry_page.to_string()),
                ("limit", config.telemetry_limit.to_string()),
                ("range", config.telemetry_range.clone()),
            ],
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch_batch(&self) -> Result<Vec<Value>, CycleError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .query(&self.query)
            .send()
            .await
            .map_err(|err| CycleError::NetworkFailure(describe_transport_error(&err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CycleError::NetworkFailure(format!(
                "provider answered {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CycleError::NetworkFailure(describe_transport_error(&err)))?;
        parse_envelope(&body)
    }
}

/// Only `{ "success": true, "data": [...] }` is accepted; the items themselves are left untyped.
pub fn parse_envelope(body: &[u8]) -> Result<Vec<Value>, CycleError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| CycleError::MalformedEnvelope(format!("body is not JSON: {err}")))?;
    let Value::Object(mut envelope) = value else {
        return Err(CycleError::MalformedEnvelope(
            "body is not a JSON object".to_string(),
        ));
    };

    if envelope.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(CycleError::MalformedEnvelope(
            "`success` is not true".to_string(),
        ));
    }

    match envelope.remove("data") {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(CycleError::MalformedEnvelope(
            "`data` is not an array".to_string(),
        )),
        None => Err(CycleError::MalformedEnvelope("`data` is missing".to_string())),
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
