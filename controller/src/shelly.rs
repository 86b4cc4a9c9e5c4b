use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use shelly_sync_common::{JobSpec, ScheduleJob};

use crate::device::{
    DeviceError, HttpResponse, RelayDevice, METHOD_HTTP_GET, METHOD_SCHEDULE_CREATE,
    METHOD_SCHEDULE_DELETE, METHOD_SCHEDULE_LIST, METHOD_SWITCH_GET_STATUS, METHOD_SWITCH_SET,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Gen2 JSON-RPC client: every command is a frame POSTed to `{device}/rpc`.
pub struct ShellyRpcClient {
    http: reqwest::Client,
    endpoint: String,
    switch_id: u8,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SwitchStatus {
    output: bool,
}

#[derive(Debug, Deserialize)]
struct ScheduleList {
    #[serde(default)]
    jobs: Vec<ScheduleJob>,
}

#[derive(Debug, Deserialize)]
struct CreatedJob {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct HttpGetResult {
    code: u16,
    #[serde(default)]
    body: String,
}

impl ShellyRpcClient {
    pub fn new(base_url: &str, switch_id: u8) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build device http client")?;

        Ok(Self {
            http,
            endpoint: format!("{}/rpc", base_url.trim_end_matches('/')),
            switch_id,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<R, DeviceError> {
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, "device rpc");

        // Error frames come back with a non-2xx status, so the body is parsed
        // regardless of the HTTP status.
        let reply: RpcReply = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = reply.error {
            return Err(DeviceError::Rpc {
                method,
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(reply.result.unwrap_or(Value::Null)).map_err(|err| {
            DeviceError::Malformed {
                method,
                detail: err.to_string(),
            }
        })
    }
}

#[async_trait]
impl RelayDevice for ShellyRpcClient {
    async fn switch_state(&self) -> Result<bool, DeviceError> {
        let status: SwitchStatus = self
            .call(METHOD_SWITCH_GET_STATUS, json!({ "id": self.switch_id }))
            .await?;
        Ok(status.output)
    }

    async fn set_switch(&self, on: bool) -> Result<(), DeviceError> {
        self.call::<Value>(METHOD_SWITCH_SET, json!({ "id": self.switch_id, "on": on }))
            .await?;
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleJob>, DeviceError> {
        let list: ScheduleList = self.call(METHOD_SCHEDULE_LIST, json!({})).await?;
        Ok(list.jobs)
    }

    async fn delete_schedule(&self, id: u64) -> Result<(), DeviceError> {
        self.call::<Value>(METHOD_SCHEDULE_DELETE, json!({ "id": id }))
            .await?;
        Ok(())
    }

    async fn create_schedule(&self, job: &JobSpec) -> Result<u64, DeviceError> {
        let params = serde_json::to_value(job).map_err(|err| DeviceError::Malformed {
            method: METHOD_SCHEDULE_CREATE,
            detail: err.to_string(),
        })?;
        let created: CreatedJob = self.call(METHOD_SCHEDULE_CREATE, params).await?;
        Ok(created.id)
    }

    async fn http_get(&self, url: &str) -> Result<HttpResponse, DeviceError> {
        let result: HttpGetResult = self
            .call(METHOD_HTTP_GET, json!({ "url": url, "timeout": 10 }))
            .await?;
        Ok(HttpResponse {
            code: result.code,
            body: result.body,
        })
    }
}
