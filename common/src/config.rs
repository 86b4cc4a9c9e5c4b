use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::gate::QuietHours;

pub const DEFAULT_TIMEZONE: &str = "Europe/Helsinki";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BookingConfig {
    pub base_url: String,
    pub property_id: String,
    pub calendar_id: String,
    pub resource_id: String,
    pub api_key: String,
    pub days_ahead: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kiinteistodata.fi/open-api-v1/properties".to_string(),
            property_id: String::new(),
            calendar_id: String::new(),
            resource_id: String::new(),
            api_key: String::new(),
            days_ahead: 7,
        }
    }
}

impl BookingConfig {
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today, today + Duration::days(i64::from(self.days_ahead)))
    }

    pub fn timings_url(&self, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/{}/modern-booking-calendars/{}/resources/{}/timings/{}/{}/?api_key={}",
            self.base_url.trim_end_matches('/'),
            self.property_id,
            self.calendar_id,
            self.resource_id,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            self.api_key
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Base URL of the relay, e.g. `http://192.168.1.40`.
    pub url: String,
    pub switch_id: u8,
    /// Pause after every schedule delete/create call.
    pub command_spacing_ms: u64,
    /// Let the relay perform the booking fetch instead of this host.
    pub fetch_via_device: bool,
    pub simulate: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.33.1".to_string(),
            switch_id: 0,
            command_spacing_ms: 200,
            fetch_via_device: false,
            simulate: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub night_start_hour: u8,
    pub night_end_hour: u8,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let quiet = QuietHours::default();
        Self {
            interval_ms: 300_000,
            night_start_hour: quiet.night_start_hour,
            night_end_hour: quiet.night_end_hour,
        }
    }
}

impl PollingConfig {
    pub fn quiet_hours(&self) -> QuietHours {
        QuietHours {
            night_start_hour: self.night_start_hour,
            night_end_hour: self.night_end_hour,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub publish_interval_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
            publish_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub booking: BookingConfig,
    pub device: DeviceConfig,
    pub polling: PollingConfig,
    pub timezone: String,
    pub http_port: u16,
    pub mqtt: Option<MqttConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            booking: BookingConfig::default(),
            device: DeviceConfig::default(),
            polling: PollingConfig::default(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            http_port: 8080,
            mqtt: None,
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.booking.days_ahead = self.booking.days_ahead.clamp(1, 60);
        self.polling.interval_ms = self.polling.interval_ms.max(10_000);
        self.polling.night_start_hour = self.polling.night_start_hour.min(24);
        self.polling.night_end_hour = self.polling.night_end_hour.min(23);
        self.device.command_spacing_ms = self.device.command_spacing_ms.min(10_000);

        if self.timezone.parse::<Tz>().is_err() {
            self.timezone = DEFAULT_TIMEZONE.to_string();
        }

        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.publish_interval_ms = mqtt.publish_interval_ms.max(1_000);
        }
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::Europe::Helsinki)
    }
}

/// Masks the `api_key` query value so URLs can be logged.
pub fn redact_api_key(url: &str) -> String {
    match url.find("api_key=") {
        Some(index) => {
            let value_start = index + "api_key=".len();
            let rest = &url[value_start..];
            let value_end = rest.find('&').map_or(url.len(), |end| value_start + end);
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_timings_url_for_rolling_range() {
        let booking = BookingConfig {
            base_url: "https://api.example.test/properties/".to_string(),
            property_id: "p1".to_string(),
            calendar_id: "c2".to_string(),
            resource_id: "r3".to_string(),
            api_key: "secret".to_string(),
            days_ahead: 7,
        };

        let (start, end) = booking.date_range(NaiveDate::from_ymd_opt(2026, 12, 28).unwrap());
        let url = booking.timings_url(start, end);

        assert_eq!(
            url,
            "https://api.example.test/properties/p1/modern-booking-calendars/c2/resources/r3/timings/2026-12-28/2027-01-04/?api_key=secret"
        );
    }

    #[test]
    fn redacts_api_key() {
        assert_eq!(
            redact_api_key("https://x/timings/a/b/?api_key=secret"),
            "https://x/timings/a/b/?api_key=***"
        );
        assert_eq!(
            redact_api_key("https://x/?api_key=secret&lang=fi"),
            "https://x/?api_key=***&lang=fi"
        );
        assert_eq!(redact_api_key("https://x/"), "https://x/");
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"booking": {"property_id": "p1"}, "timezone": "UTC"}"#)
                .unwrap();

        assert_eq!(config.booking.property_id, "p1");
        assert_eq!(config.booking.days_ahead, 7);
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.device.command_spacing_ms, 200);
        assert_eq!(config.tz(), chrono_tz::UTC);
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = RuntimeConfig::default();
        config.booking.days_ahead = 0;
        config.polling.interval_ms = 5;
        config.polling.night_start_hour = 30;
        config.polling.night_end_hour = 99;
        config.timezone = "Mars/Olympus".to_string();

        config.sanitize();

        assert_eq!(config.booking.days_ahead, 1);
        assert_eq!(config.polling.interval_ms, 10_000);
        assert_eq!(config.polling.night_start_hour, 24);
        assert_eq!(config.polling.night_end_hour, 23);
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
    }
}
