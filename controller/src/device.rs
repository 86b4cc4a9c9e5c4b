use async_trait::async_trait;
use thiserror::Error;

use shelly_sync_common::{JobSpec, ScheduleJob};

pub const METHOD_SWITCH_GET_STATUS: &str = "Switch.GetStatus";
pub const METHOD_SWITCH_SET: &str = "Switch.Set";
pub const METHOD_SCHEDULE_LIST: &str = "Schedule.List";
pub const METHOD_SCHEDULE_DELETE: &str = "Schedule.Delete";
pub const METHOD_SCHEDULE_CREATE: &str = "Schedule.Create";
pub const METHOD_HTTP_GET: &str = "HTTP.GET";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{method} failed with code {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("device request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed {method} reply: {detail}")]
    Malformed {
        method: &'static str,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub code: u16,
    pub body: String,
}

/// Primitive command interface of a single-channel relay. Every call is one
/// request/response round trip and may fail independently.
#[async_trait]
pub trait RelayDevice: Send + Sync {
    async fn switch_state(&self) -> Result<bool, DeviceError>;

    async fn set_switch(&self, on: bool) -> Result<(), DeviceError>;

    async fn list_schedules(&self) -> Result<Vec<ScheduleJob>, DeviceError>;

    async fn delete_schedule(&self, id: u64) -> Result<(), DeviceError>;

    /// Returns the id the device assigned to the new job.
    async fn create_schedule(&self, job: &JobSpec) -> Result<u64, DeviceError>;

    /// Has the device itself perform an HTTP GET.
    async fn http_get(&self, url: &str) -> Result<HttpResponse, DeviceError>;
}
