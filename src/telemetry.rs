use crate::channels::{Channel, FIELD_ALIASES, TIMESTAMP_FIELDS};
use crate::thresholds::{classify, Tier};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// One normalized telemetry sample. Channels missing from `channels` had no reading this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    channels: BTreeMap<Channel, f64>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, channels: BTreeMap<Channel, f64>) -> Self {
        Self {
            timestamp,
            channels,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn channels(&self) -> &BTreeMap<Channel, f64> {
        &self.channels
    }

    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.channels.get(&channel).copied()
    }

    pub fn tier(&self, channel: Channel) -> Option<Tier> {
        self.value(channel).map(|value| classify(channel.kind, value))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("item has neither `time` nor `timestamp`")]
    MissingTimestamp,
    #[error("malformed item: {0}")]
    MalformedItem(String),
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub readings: Vec<Reading>,
    pub rejected: Vec<(usize, RejectReason)>,
}

pub fn normalize(item: &Value) -> Result<Reading, RejectReason> {
    let Value::Object(fields) = item else {
        return Err(RejectReason::MalformedItem(format!(
            "expected an object, got {}",
            json_kind(item)
        )));
    };

    let timestamp = parse_timestamp(fields)?;

    let mut channels = BTreeMap::new();
    for (field, channel) in FIELD_ALIASES {
        let Some(value) = fields.get(*field).and_then(Value::as_f64) else {
            continue;
        };
        if value.is_finite() {
            channels.entry(*channel).or_insert(value);
        }
    }

    Ok(Reading::new(timestamp, channels))
}

/// Rejections are collected per item index; they never abort the rest of the batch.
pub fn normalize_batch(items: &[Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for (idx, item) in items.iter().enumerate() {
        match normalize(item) {
            Ok(reading) => batch.readings.push(reading),
            Err(reason) => {
                tracing::warn!(item = idx, reason = %reason, "skipping telemetry item");
                batch.rejected.push((idx, reason));
            }
        }
    }
    batch
}

fn parse_timestamp(fields: &Map<String, Value>) -> Result<DateTime<Utc>, RejectReason> {
    for name in TIMESTAMP_FIELDS {
        match fields.get(name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(raw)) if raw.trim().is_empty() => continue,
            Some(Value::String(raw)) => return parse_timestamp_text(name, raw.trim()),
            Some(Value::Number(number)) => {
                let parsed = match number.as_i64() {
                    Some(ms) => millis_to_dt(ms),
                    None => number
                        .as_f64()
                        .filter(|secs| secs.is_finite())
                        .and_then(|secs| millis_to_dt((secs * 1000.0) as i64)),
                };
                return parsed.ok_or_else(|| {
                    RejectReason::MalformedItem(format!("`{name}` out of range: {number}"))
                });
            }
            Some(other) => {
                return Err(RejectReason::MalformedItem(format!(
                    "`{name}` is {}",
                    json_kind(other)
                )));
            }
        }
    }
    Err(RejectReason::MissingTimestamp)
}

/// Offset-less forms the provider may send; they are read as UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp_text(name: &str, raw: &str) -> Result<DateTime<Utc>, RejectReason> {
    let err = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(err) => err,
    };
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RejectReason::MalformedItem(format!("invalid `{name}` {raw:?}: {err}")))
}

fn millis_to_dt(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
