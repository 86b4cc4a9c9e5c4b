pub mod config;
pub mod enforce;
pub mod gate;
pub mod plan;
pub mod schedule;
pub mod snapshot;
pub mod topics;
pub mod types;
pub mod window;

pub use config::{BookingConfig, DeviceConfig, MqttConfig, PollingConfig, RuntimeConfig};
pub use enforce::{correction, should_be_on};
pub use gate::QuietHours;
pub use plan::{plan_rebuild, RebuildStep};
pub use schedule::{build_jobs, CronTrigger, DayOfWeek, JobSpec, ScheduleJob};
pub use snapshot::{Snapshot, SyncState};
pub use topics::*;
pub use types::{ControllerStatus, CycleOutcome, RebuildReport, SchedulePayload};
pub use window::{parse_timings, validate_windows, ResponseError, TimeWindow};
