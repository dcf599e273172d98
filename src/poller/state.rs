use super::buffer::History;
use crate::telemetry::Reading;
use crate::upstream::CycleError;
use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PollPhase {
    #[default]
    Idle,
    Fetching,
}

impl PollPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PollPhase::Idle => "idle",
            PollPhase::Fetching => "fetching",
        }
    }
}

/// What subscribers see after each transition. Failed cycles keep `latest`/`history`
/// from the last good cycle and only set `error`.
#[derive(Clone, Debug, Default)]
pub struct DashboardSnapshot {
    pub latest: Option<Reading>,
    pub history: History,
    pub last_updated: Option<DateTime<Utc>>,
    pub phase: PollPhase,
    pub error: Option<CycleError>,
    pub rejected_last_cycle: usize,
    pub rejected_total: u64,
    /// Readings already buffered from an earlier, overlapping response.
    pub skipped_last_cycle: usize,
    pub skipped_total: u64,
    pub cycles: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Queued,
    Coalesced,
    Stopped,
}

impl RefreshOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshOutcome::Queued => "queued",
            RefreshOutcome::Coalesced => "coalesced",
            RefreshOutcome::Stopped => "stopped",
        }
    }
}
