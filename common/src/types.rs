use serde::{Deserialize, Serialize};

use crate::schedule::JobSpec;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub deleted: usize,
    #[serde(rename = "deleteFailures")]
    pub delete_failures: usize,
    #[serde(rename = "listingFailed")]
    pub listing_failed: bool,
    pub created: usize,
    #[serde(rename = "createFailures")]
    pub create_failures: usize,
    pub committed: bool,
}

/// What a single sync cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleOutcome {
    QuietHours,
    FetchFailed,
    InvalidResponse,
    Unchanged,
    Cleared,
    Rebuilt(RebuildReport),
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuietHours => "QUIET_HOURS",
            Self::FetchFailed => "FETCH_FAILED",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::Unchanged => "UNCHANGED",
            Self::Cleared => "CLEARED",
            Self::Rebuilt(_) => "REBUILT",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "relayOn")]
    pub relay_on: Option<bool>,
    #[serde(rename = "pollingAllowed")]
    pub polling_allowed: bool,
    #[serde(rename = "lastOutcome")]
    pub last_outcome: Option<CycleOutcome>,
    #[serde(rename = "lastCycleEpoch")]
    pub last_cycle_epoch: Option<i64>,
    #[serde(rename = "cycleCount")]
    pub cycle_count: u64,
    #[serde(rename = "appliedWindows")]
    pub applied_windows: usize,
    #[serde(rename = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulePayload {
    pub windows: Vec<TimeWindow>,
    pub jobs: Vec<JobSpec>,
}
