use chrono_tz::Tz;

use crate::schedule::{build_jobs, JobSpec, ScheduleJob};
use crate::window::TimeWindow;

/// One device-facing step of a schedule table rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildStep {
    Delete(u64),
    Create(JobSpec),
    Delay(u64),
}

/// Full replace of the device schedule table: every existing job is deleted,
/// then two jobs per window are created. Every device call is followed by a
/// `Delay(spacing_ms)` so the steps can be executed strictly one at a time.
pub fn plan_rebuild(
    existing: &[ScheduleJob],
    windows: &[TimeWindow],
    tz: &Tz,
    switch_id: u8,
    spacing_ms: u64,
) -> Vec<RebuildStep> {
    let deletes = existing.iter().map(|job| RebuildStep::Delete(job.id));
    let creates = build_jobs(windows, tz, switch_id)
        .into_iter()
        .map(RebuildStep::Create);

    deletes
        .chain(creates)
        .flat_map(|step| [step, RebuildStep::Delay(spacing_ms)])
        .collect()
}
