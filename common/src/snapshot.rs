use chrono::{DateTime, Utc};

use crate::types::CycleOutcome;
use crate::window::TimeWindow;

/// The window sequence last fully programmed onto the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    applied: Option<Vec<TimeWindow>>,
}

impl Snapshot {
    /// Exact, order-sensitive comparison. An absent snapshot never matches,
    /// so an empty fetch always re-enforces "off".
    pub fn matches(&self, windows: &[TimeWindow]) -> bool {
        matches!(&self.applied, Some(applied) if applied.as_slice() == windows)
    }

    pub fn commit(&mut self, windows: &[TimeWindow]) {
        self.applied = Some(windows.to_vec());
    }

    pub fn clear(&mut self) {
        self.applied = None;
    }

    pub fn windows(&self) -> Option<&[TimeWindow]> {
        self.applied.as_deref()
    }
}

/// State carried from one sync cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub snapshot: Snapshot,
    /// Relay state as last read from, or written to, the device.
    pub relay_on: Option<bool>,
    pub last_outcome: Option<CycleOutcome>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub cycle_count: u64,
}

impl SyncState {
    pub fn record(&mut self, outcome: CycleOutcome, at: DateTime<Utc>) {
        self.last_outcome = Some(outcome);
        self.last_cycle_at = Some(at);
        self.cycle_count = self.cycle_count.saturating_add(1);
    }
}
