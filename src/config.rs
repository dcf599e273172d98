use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SETUP_CONFIG_PATH: &str = "/etc/greenhouse-monitor/config.json";
const DEFAULT_EQUIPMENT_TAGS: &str =
    "Sensor Norte,Sensor Sul,Sensor Leste,Sensor Oeste,Sensor Tanque";
const MIN_FETCH_TIMEOUT_MS: u64 = 250;

fn setup_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MONITOR_SETUP_CONFIG_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(DEFAULT_SETUP_CONFIG_PATH)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    telemetry_url: Option<String>,
    #[serde(default)]
    telemetry_token: Option<String>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    fetch_timeout_ms: Option<u64>,
    #[serde(default)]
    buffer_capacity: Option<usize>,
    #[serde(default)]
    contentful_space_id: Option<String>,
    #[serde(default)]
    contentful_environment: Option<String>,
    #[serde(default)]
    equipment_tags: Option<Vec<String>>,
}

fn load_setup_config_overrides() -> Option<SetupConfigOverrides> {
    let path = setup_config_path();
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "greenhouse-monitor failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    let mut bytes = contents.into_bytes();
    match simd_json::serde::from_slice(&mut bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "greenhouse-monitor failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_value(key).and_then(|value| value.parse::<T>().ok())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

fn apply_setup_overrides(config: &mut Config, overrides: &SetupConfigOverrides) {
    let env_allows = |key: &str| env_value(key).is_none();

    if env_allows("MONITOR_TELEMETRY_URL") {
        if let Some(url) = non_empty(overrides.telemetry_url.as_deref()) {
            config.telemetry_url = url;
        }
    }
    if env_allows("MONITOR_TELEMETRY_TOKEN") {
        if let Some(token) = non_empty(overrides.telemetry_token.as_deref()) {
            config.telemetry_token = token;
        }
    }
    if env_allows("MONITOR_POLL_INTERVAL_MS") {
        if let Some(value) = overrides.poll_interval_ms.filter(|v| *v != 0) {
            config.poll_interval_ms = value;
        }
    }
    if env_allows("MONITOR_FETCH_TIMEOUT_MS") {
        if let Some(value) = overrides.fetch_timeout_ms.filter(|v| *v != 0) {
            config.fetch_timeout_ms = value;
        }
    }
    if env_allows("MONITOR_BUFFER_CAPACITY") {
        if let Some(value) = overrides.buffer_capacity.filter(|v| *v != 0) {
            config.buffer_capacity = value;
        }
    }
    if env_allows("MONITOR_CONTENTFUL_SPACE_ID") && env_allows("CONTENTFUL_SPACE_ID") {
        if let Some(space) = non_empty(overrides.contentful_space_id.as_deref()) {
            config.contentful_space_id = space;
        }
    }
    if env_allows("MONITOR_CONTENTFUL_ENVIRONMENT") {
        if let Some(environment) = non_empty(overrides.contentful_environment.as_deref()) {
            config.contentful_environment = environment;
        }
    }
    if env_allows("MONITOR_EQUIPMENT_TAGS") {
        if let Some(tags) = overrides.equipment_tags.as_ref() {
            let tags = parse_equipment_tags(&tags.join(","));
            if !tags.is_empty() {
                config.equipment_tags = tags;
            }
        }
    }
}

/// Splits a comma separated enumeration, trimming entries and dropping blanks and repeats.
pub fn parse_equipment_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[derive(Clone, Debug)]
pub struct Config {
    pub telemetry_url: String,
    pub telemetry_token: String,
    pub telemetry_page: u32,
    pub telemetry_limit: u32,
    pub telemetry_range: String,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub buffer_capacity: usize,
    pub contentful_space_id: String,
    pub contentful_environment: String,
    pub contentful_read_token: String,
    pub contentful_write_token: String,
    pub contentful_content_type: String,
    pub contentful_locale: String,
    pub contentful_delivery_url: String,
    pub contentful_management_url: String,
    pub equipment_tags: Vec<String>,
    pub grpc_socket_path: String,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let setup_overrides = load_setup_config_overrides();

        let telemetry_url = env_value("MONITOR_TELEMETRY_URL").unwrap_or_default();
        let telemetry_token = env_value("MONITOR_TELEMETRY_TOKEN").unwrap_or_default();
        let telemetry_page = env_parsed("MONITOR_TELEMETRY_PAGE").unwrap_or(1);
        let telemetry_limit = env_parsed("MONITOR_TELEMETRY_LIMIT").unwrap_or(10);
        let telemetry_range =
            env_value("MONITOR_TELEMETRY_RANGE").unwrap_or_else(|| "all".to_string());

        let poll_interval_ms = env_parsed("MONITOR_POLL_INTERVAL_MS").unwrap_or(30_000);
        let fetch_timeout_ms = env_parsed("MONITOR_FETCH_TIMEOUT_MS").unwrap_or(10_000);
        let buffer_capacity = env_parsed("MONITOR_BUFFER_CAPACITY").unwrap_or(60);

        let contentful_space_id = env_value("MONITOR_CONTENTFUL_SPACE_ID")
            .or_else(|| env_value("CONTENTFUL_SPACE_ID"))
            .unwrap_or_default();
        let contentful_environment = env_value("MONITOR_CONTENTFUL_ENVIRONMENT")
            .unwrap_or_else(|| "master".to_string());
        let contentful_read_token = env_value("MONITOR_CONTENTFUL_READ_TOKEN")
            .or_else(|| env_value("CONTENTFUL_ACCESS_TOKEN"))
            .unwrap_or_default();
        let contentful_write_token = env_value("MONITOR_CONTENTFUL_WRITE_TOKEN")
            .or_else(|| env_value("CONTENTFUL_CMA_TOKEN"))
            .unwrap_or_default();
        let contentful_content_type = env_value("MONITOR_CONTENTFUL_CONTENT_TYPE")
            .unwrap_or_else(|| "device".to_string());
        let contentful_locale =
            env_value("MONITOR_CONTENTFUL_LOCALE").unwrap_or_else(|| "en-US".to_string());
        let contentful_delivery_url = env_value("MONITOR_CONTENTFUL_DELIVERY_URL")
            .unwrap_or_else(|| "https://cdn.contentful.com".to_string());
        let contentful_management_url = env_value("MONITOR_CONTENTFUL_MANAGEMENT_URL")
            .unwrap_or_else(|| "https://api.contentful.com".to_string());

        let equipment_tags = parse_equipment_tags(
            &env_value("MONITOR_EQUIPMENT_TAGS")
                .unwrap_or_else(|| DEFAULT_EQUIPMENT_TAGS.to_string()),
        );

        let grpc_socket_path = env_value("MONITOR_GRPC_SOCKET")
            .unwrap_or_else(|| "/tmp/greenhouse_monitor.sock".to_string());
        let otlp_endpoint = env_value("OTEL_EXPORTER_OTLP_ENDPOINT");

        let mut config = Self {
            telemetry_url,
            telemetry_token,
            telemetry_page,
            telemetry_limit,
            telemetry_range,
            poll_interval_ms,
            fetch_timeout_ms,
            buffer_capacity,
            contentful_space_id,
            contentful_environment,
            contentful_read_token,
            contentful_write_token,
            contentful_content_type,
            contentful_locale,
            contentful_delivery_url,
            contentful_management_url,
            equipment_tags,
            grpc_socket_path,
            otlp_endpoint,
        };

        if let Some(overrides) = setup_overrides.as_ref() {
            apply_setup_overrides(&mut config, overrides);
        }

        config.validate().context("invalid greenhouse-monitor configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.telemetry_url.is_empty(),
            "MONITOR_TELEMETRY_URL is required"
        );
        anyhow::ensure!(
            !self.telemetry_token.is_empty(),
            "MONITOR_TELEMETRY_TOKEN is required"
        );
        anyhow::ensure!(self.poll_interval_ms > 0, "poll interval must be positive");
        anyhow::ensure!(self.buffer_capacity > 0, "buffer capacity must be positive");
        anyhow::ensure!(
            !self.contentful_space_id.is_empty(),
            "MONITOR_CONTENTFUL_SPACE_ID (or CONTENTFUL_SPACE_ID) is required"
        );
        anyhow::ensure!(
            !self.contentful_read_token.is_empty(),
            "MONITOR_CONTENTFUL_READ_TOKEN (or CONTENTFUL_ACCESS_TOKEN) is required"
        );
        anyhow::ensure!(
            !self.contentful_write_token.is_empty(),
            "MONITOR_CONTENTFUL_WRITE_TOKEN (or CONTENTFUL_CMA_TOKEN) is required"
        );
        anyhow::ensure!(
            !self.equipment_tags.is_empty(),
            "MONITOR_EQUIPMENT_TAGS must name at least one equipment tag"
        );
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bounded below the poll interval so a hung fetch never overlaps the next tick.
    pub fn fetch_timeout(&self) -> Duration {
        let ceiling = self.poll_interval_ms.saturating_sub(1).max(1);
        let timeout_ms = self
            .fetch_timeout_ms
            .clamp(MIN_FETCH_TIMEOUT_MS.min(ceiling), ceiling);
        Duration::from_millis(timeout_ms)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        telemetry_url: "http://telemetry.test/v1/data".to_string(),
        telemetry_token: "telemetry-token".to_string(),
        telemetry_page: 1,
        telemetry_limit: 10,
        telemetry_range: "all".to_string(),
        poll_interval_ms: 30_000,
        fetch_timeout_ms: 10_000,
        buffer_capacity: 5,
        contentful_space_id: "space".to_string(),
        contentful_environment: "master".to_string(),
        contentful_read_token: "cda".to_string(),
        contentful_write_token: "cma".to_string(),
        contentful_content_type: "device".to_string(),
        contentful_locale: "en-US".to_string(),
        contentful_delivery_url: "https://cdn.contentful.test".to_string(),
        contentful_management_url: "https://api.contentful.test".to_string(),
        equipment_tags: parse_equipment_tags(DEFAULT_EQUIPMENT_TAGS),
        grpc_socket_path: "/tmp/greenhouse_monitor_test.sock".to_string(),
        otlp_endpoint: None,
    }
}
