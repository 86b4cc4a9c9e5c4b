use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use shelly_sync_common::{JobSpec, ScheduleJob};

use crate::device::{
    DeviceError, HttpResponse, RelayDevice, METHOD_HTTP_GET, METHOD_SCHEDULE_CREATE,
    METHOD_SCHEDULE_DELETE, METHOD_SCHEDULE_LIST, METHOD_SWITCH_GET_STATUS, METHOD_SWITCH_SET,
};

/// In-memory relay with a schedule table, for running the controller without
/// hardware. `HTTP.GET` is performed for real.
pub struct SimulatedDevice {
    state: Mutex<SimState>,
    http: reqwest::Client,
}

#[derive(Debug)]
struct SimState {
    switch_on: bool,
    jobs: Vec<(u64, JobSpec)>,
    next_id: u64,
    calls: Vec<&'static str>,
    /// Per-method call ordinals (0-based) that fail.
    failures: HashMap<&'static str, Vec<usize>>,
    http_body: Option<String>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            switch_on: false,
            jobs: Vec::new(),
            next_id: 1,
            calls: Vec::new(),
            failures: HashMap::new(),
            http_body: None,
        }
    }
}

impl SimState {
    fn enter(&mut self, method: &'static str) -> Result<(), DeviceError> {
        let ordinal = self.calls.iter().filter(|call| **call == method).count();
        self.calls.push(method);

        let fails = self
            .failures
            .get(method)
            .is_some_and(|ordinals| ordinals.contains(&ordinal));
        if fails {
            return Err(DeviceError::Rpc {
                method,
                code: -1,
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            http: reqwest::Client::new(),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayDevice for SimulatedDevice {
    async fn switch_state(&self) -> Result<bool, DeviceError> {
        let mut state = self.state.lock().await;
        state.enter(METHOD_SWITCH_GET_STATUS)?;
        Ok(state.switch_on)
    }

    async fn set_switch(&self, on: bool) -> Result<(), DeviceError> {
        let mut state = self.state.lock().await;
        state.enter(METHOD_SWITCH_SET)?;
        info!(on, "[sim] switch set");
        state.switch_on = on;
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleJob>, DeviceError> {
        let mut state = self.state.lock().await;
        state.enter(METHOD_SCHEDULE_LIST)?;
        Ok(state
            .jobs
            .iter()
            .map(|(id, job)| ScheduleJob {
                id: *id,
                enable: job.enable,
                timespec: job.timespec.clone(),
            })
            .collect())
    }

    async fn delete_schedule(&self, id: u64) -> Result<(), DeviceError> {
        let mut state = self.state.lock().await;
        state.enter(METHOD_SCHEDULE_DELETE)?;
        state.jobs.retain(|(job_id, _)| *job_id != id);
        Ok(())
    }

    async fn create_schedule(&self, job: &JobSpec) -> Result<u64, DeviceError> {
        let mut state = self.state.lock().await;
        state.enter(METHOD_SCHEDULE_CREATE)?;
        let id = state.next_id;
        state.next_id += 1;
        state.jobs.push((id, job.clone()));
        info!(id, timespec = %job.timespec, "[sim] schedule created");
        Ok(id)
    }

    async fn http_get(&self, url: &str) -> Result<HttpResponse, DeviceError> {
        let canned = {
            let mut state = self.state.lock().await;
            state.enter(METHOD_HTTP_GET)?;
            state.http_body.clone()
        };
        if let Some(body) = canned {
            return Ok(HttpResponse { code: 200, body });
        }

        let response = self.http.get(url).send().await?;
        let code = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { code, body })
    }
}

#[cfg(test)]
impl SimulatedDevice {
    pub async fn fail_call(&self, method: &'static str, ordinal: usize) {
        let mut state = self.state.lock().await;
        state.failures.entry(method).or_default().push(ordinal);
    }

    pub async fn set_http_body(&self, body: &str) {
        self.state.lock().await.http_body = Some(body.to_string());
    }

    pub async fn seed_job(&self, job: JobSpec) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.jobs.push((id, job));
        id
    }

    pub async fn force_switch(&self, on: bool) {
        self.state.lock().await.switch_on = on;
    }

    pub async fn is_on(&self) -> bool {
        self.state.lock().await.switch_on
    }

    pub async fn jobs(&self) -> Vec<JobSpec> {
        let state = self.state.lock().await;
        state.jobs.iter().map(|(_, job)| job.clone()).collect()
    }

    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count_calls(&self, method: &str) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|call| **call == method).count()
    }

    pub async fn clear_calls(&self) {
        let mut state = self.state.lock().await;
        state.calls.clear();
        state.failures.clear();
    }
}
