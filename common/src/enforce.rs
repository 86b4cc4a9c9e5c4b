use chrono::{DateTime, Utc};

use crate::window::TimeWindow;

/// Whether `now` falls inside any window. Windows are assumed
/// non-overlapping, so the scan stops at the first hit.
pub fn should_be_on(windows: &[TimeWindow], now: DateTime<Utc>) -> bool {
    windows.iter().any(|window| window.contains(now))
}

/// The corrective command to issue, if the observed relay state disagrees
/// with the desired one.
pub fn correction(should_be_on: bool, is_on: bool) -> Option<bool> {
    (should_be_on != is_on).then_some(should_be_on)
}
