use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use shelly_sync_common::{config::redact_api_key, BookingConfig};

use crate::device::{DeviceError, RelayDevice};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("booking request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("booking api answered HTTP {0}")]
    Status(u16),
    #[error("relay could not fetch bookings: {0}")]
    Device(#[from] DeviceError),
}

/// Upstream source of booking windows. Returns the raw response body; shape
/// validation happens in the sync driver.
#[async_trait]
pub trait BookingSource: Send + Sync {
    async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<String, BookingError>;
}

/// Fetches timings straight from the booking API.
pub struct HttpBookingSource {
    http: reqwest::Client,
    config: BookingConfig,
}

impl HttpBookingSource {
    pub fn new(config: BookingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build booking http client")?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl BookingSource for HttpBookingSource {
    async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<String, BookingError> {
        let url = self.config.timings_url(start, end);
        info!(url = %redact_api_key(&url), "fetching timings");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BookingError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Has the relay perform the booking request, so only the relay needs
/// outbound internet access.
pub struct DeviceBookingSource {
    device: Arc<dyn RelayDevice>,
    config: BookingConfig,
}

impl DeviceBookingSource {
    pub fn new(device: Arc<dyn RelayDevice>, config: BookingConfig) -> Self {
        Self { device, config }
    }
}

#[async_trait]
impl BookingSource for DeviceBookingSource {
    async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<String, BookingError> {
        let url = self.config.timings_url(start, end);
        info!(url = %redact_api_key(&url), "fetching timings via relay");

        let response = self.device.http_get(&url).await?;
        if !(200..300).contains(&response.code) {
            return Err(BookingError::Status(response.code));
        }
        Ok(response.body)
    }
}
