use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use shelly_sync_common::{
    plan_rebuild, CycleOutcome, RebuildReport, RebuildStep, SyncState, TimeWindow,
};

use crate::device::RelayDevice;
use crate::enforcer;

/// Replaces the device schedule table with jobs derived from a window set.
#[derive(Debug, Clone)]
pub struct Reconciler {
    tz: Tz,
    switch_id: u8,
    spacing: Duration,
}

impl Reconciler {
    pub fn new(tz: Tz, switch_id: u8, spacing: Duration) -> Self {
        Self {
            tz,
            switch_id,
            spacing,
        }
    }

    /// Brings the device in line with `windows`, which must already differ
    /// from the committed snapshot.
    ///
    /// An empty set forces the relay off and clears the snapshot without
    /// touching the schedule table. Otherwise the table is rebuilt, the
    /// snapshot is committed only if every job was created, and the relay
    /// state is enforced.
    pub async fn reconcile(
        &self,
        device: &dyn RelayDevice,
        windows: &[TimeWindow],
        state: &mut SyncState,
        clock: &(dyn Fn() -> DateTime<Utc> + Send + Sync),
    ) -> CycleOutcome {
        if windows.is_empty() {
            info!("no timings, enforcing OFF");
            match device.set_switch(false).await {
                Ok(()) => state.relay_on = Some(false),
                Err(err) => warn!("failed to switch relay off: {err}"),
            }
            state.snapshot.clear();
            return CycleOutcome::Cleared;
        }

        info!("applying {} timing pairs", windows.len());
        let report = self.rebuild(device, windows).await;

        if report.committed {
            state.snapshot.commit(windows);
            info!("all {} schedules applied", report.created);
            for window in windows {
                info!("  {}", window.describe(&self.tz));
            }
        } else {
            warn!(
                created = report.created,
                failed = report.create_failures,
                "schedule rebuild incomplete, retrying next cycle"
            );
        }

        match enforcer::enforce(device, windows, clock()).await {
            Ok(enforcement) => state.relay_on = Some(enforcement.relay_on()),
            Err(err) => warn!("failed to enforce relay state: {err}"),
        }

        CycleOutcome::Rebuilt(report)
    }

    /// Lists, deletes and recreates jobs one call at a time, pausing after
    /// each call. Individual failures are counted and skipped.
    pub async fn rebuild(&self, device: &dyn RelayDevice, windows: &[TimeWindow]) -> RebuildReport {
        let mut report = RebuildReport::default();

        let existing = match device.list_schedules().await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!("schedule list failed, creating without cleanup: {err}");
                report.listing_failed = true;
                Vec::new()
            }
        };

        let spacing_ms = u64::try_from(self.spacing.as_millis()).unwrap_or(u64::MAX);
        let steps = plan_rebuild(&existing, windows, &self.tz, self.switch_id, spacing_ms);

        for step in steps {
            match step {
                RebuildStep::Delay(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                RebuildStep::Delete(id) => match device.delete_schedule(id).await {
                    Ok(()) => {
                        debug!(id, "schedule deleted");
                        report.deleted += 1;
                    }
                    Err(err) => {
                        warn!(id, "schedule delete failed: {err}");
                        report.delete_failures += 1;
                    }
                },
                RebuildStep::Create(job) => match device.create_schedule(&job).await {
                    Ok(id) => {
                        debug!(id, timespec = %job.timespec, "schedule created");
                        report.created += 1;
                    }
                    Err(err) => {
                        warn!(timespec = %job.timespec, "schedule create failed: {err}");
                        report.create_failures += 1;
                    }
                },
            }
        }

        report.committed = report.create_failures == 0;
        report
    }
}
