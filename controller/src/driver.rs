use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use shelly_sync_common::{
    build_jobs, parse_timings, validate_windows, BookingConfig, ControllerStatus, CycleOutcome,
    QuietHours, RuntimeConfig, SchedulePayload, SyncState,
};

use crate::booking::BookingSource;
use crate::device::RelayDevice;
use crate::reconciler::Reconciler;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Read-only view of the driver published after every cycle.
#[derive(Debug, Clone)]
pub struct SyncView {
    pub status: ControllerStatus,
    pub schedule: SchedulePayload,
}

/// Runs sync cycles: gate, fetch, validate, diff, reconcile, enforce.
pub struct SyncDriver {
    device: Arc<dyn RelayDevice>,
    source: Arc<dyn BookingSource>,
    reconciler: Reconciler,
    booking: BookingConfig,
    quiet: QuietHours,
    tz: Tz,
    timezone: String,
    switch_id: u8,
    poll_interval_ms: u64,
    clock: Clock,
    state: SyncState,
}

impl SyncDriver {
    pub fn new(
        config: &RuntimeConfig,
        device: Arc<dyn RelayDevice>,
        source: Arc<dyn BookingSource>,
    ) -> Self {
        let tz = config.tz();
        Self {
            device,
            source,
            reconciler: Reconciler::new(
                tz,
                config.device.switch_id,
                Duration::from_millis(config.device.command_spacing_ms),
            ),
            booking: config.booking.clone(),
            quiet: config.polling.quiet_hours(),
            tz,
            timezone: config.timezone.clone(),
            switch_id: config.device.switch_id,
            poll_interval_ms: config.polling.interval_ms,
            clock: system_clock(),
            state: SyncState::default(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let now = (self.clock)();
        let outcome = self.cycle(now).await;
        self.state.record(outcome, now);
        info!(outcome = outcome.as_str(), "sync cycle finished");
        outcome
    }

    async fn cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        if !self.quiet.allows(now, &self.tz) {
            info!("night mode, enforcing OFF");
            match self.device.set_switch(false).await {
                Ok(()) => self.state.relay_on = Some(false),
                Err(err) => warn!("failed to switch relay off: {err}"),
            }
            return CycleOutcome::QuietHours;
        }

        let today = now.with_timezone(&self.tz).date_naive();
        let (start, end) = self.booking.date_range(today);
        let body = match self.source.fetch(start, end).await {
            Ok(body) => body,
            Err(err) => {
                warn!("booking fetch failed: {err}");
                return CycleOutcome::FetchFailed;
            }
        };

        let raw = match parse_timings(&body) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("invalid booking response: {err}");
                return CycleOutcome::InvalidResponse;
            }
        };

        let windows = validate_windows(&raw, &self.tz);
        if windows.len() < raw.len() {
            warn!(
                dropped = raw.len() - windows.len(),
                "ignoring timings with unparseable timestamps"
            );
        }

        if self.state.snapshot.matches(&windows) {
            info!("no changes");
            return CycleOutcome::Unchanged;
        }

        info!("changes detected, updating schedules");
        self.reconciler
            .reconcile(
                self.device.as_ref(),
                &windows,
                &mut self.state,
                self.clock.as_ref(),
            )
            .await
    }

    pub fn view(&self) -> SyncView {
        let windows = self.state.snapshot.windows().unwrap_or_default().to_vec();
        let jobs = build_jobs(&windows, &self.tz, self.switch_id);
        let now = (self.clock)();

        SyncView {
            status: ControllerStatus {
                relay_on: self.state.relay_on,
                polling_allowed: self.quiet.allows(now, &self.tz),
                last_outcome: self.state.last_outcome,
                last_cycle_epoch: self.state.last_cycle_at.map(|at| at.timestamp()),
                cycle_count: self.state.cycle_count,
                applied_windows: windows.len(),
                poll_interval_ms: self.poll_interval_ms,
                timezone: self.timezone.clone(),
            },
            schedule: SchedulePayload { windows, jobs },
        }
    }
}

/// Shared access to one driver. Cycles never overlap: the periodic loop
/// queues on the lock, manual triggers are refused while a cycle runs.
#[derive(Clone)]
pub struct SyncHandle {
    driver: Arc<Mutex<SyncDriver>>,
    view: watch::Sender<SyncView>,
}

impl SyncHandle {
    pub fn new(driver: SyncDriver) -> Self {
        let (view, _) = watch::channel(driver.view());
        Self {
            driver: Arc::new(Mutex::new(driver)),
            view,
        }
    }

    /// Waits for any running cycle, then runs one.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut driver = self.driver.lock().await;
        self.run_locked(&mut driver).await
    }

    /// Runs a cycle unless one is already in progress.
    pub async fn try_run_cycle(&self) -> Option<CycleOutcome> {
        let mut driver = self.driver.try_lock().ok()?;
        Some(self.run_locked(&mut driver).await)
    }

    pub fn view(&self) -> SyncView {
        self.view.borrow().clone()
    }

    async fn run_locked(&self, driver: &mut SyncDriver) -> CycleOutcome {
        let outcome = driver.run_cycle().await;
        self.view.send_replace(driver.view());
        outcome
    }
}
