use chrono::{DateTime, Utc};
use tracing::info;

use shelly_sync_common::{correction, should_be_on, TimeWindow};

use crate::device::{DeviceError, RelayDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    InSync { on: bool },
    Switched { on: bool },
}

impl Enforcement {
    pub fn relay_on(self) -> bool {
        match self {
            Self::InSync { on } | Self::Switched { on } => on,
        }
    }
}

/// Reads the relay and issues at most one corrective set-command so that it
/// is on iff `now` falls inside one of `windows`.
pub async fn enforce(
    device: &dyn RelayDevice,
    windows: &[TimeWindow],
    now: DateTime<Utc>,
) -> Result<Enforcement, DeviceError> {
    let desired = should_be_on(windows, now);
    let is_on = device.switch_state().await?;

    match correction(desired, is_on) {
        Some(on) => {
            info!("should be {state}, switching {state}", state = on_off(on));
            device.set_switch(on).await?;
            Ok(Enforcement::Switched { on })
        }
        None => {
            info!("state OK ({})", on_off(is_on));
            Ok(Enforcement::InSync { on: is_on })
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{METHOD_SWITCH_GET_STATUS, METHOD_SWITCH_SET};
    use crate::simulator::SimulatedDevice;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn windows() -> Vec<TimeWindow> {
        vec![TimeWindow {
            on: utc("2026-10-21T10:00:00Z"),
            off: utc("2026-10-21T12:00:00Z"),
        }]
    }

    #[tokio::test]
    async fn switches_on_inside_window() {
        let device = SimulatedDevice::new();

        let result = enforce(&device, &windows(), utc("2026-10-21T11:00:00Z"))
            .await
            .unwrap();

        assert_eq!(result, Enforcement::Switched { on: true });
        assert!(device.is_on().await);
    }

    #[tokio::test]
    async fn switches_off_outside_every_window() {
        let device = SimulatedDevice::new();
        device.force_switch(true).await;

        let result = enforce(&device, &windows(), utc("2026-10-21T12:00:00Z"))
            .await
            .unwrap();

        assert_eq!(result, Enforcement::Switched { on: false });
        assert!(!device.is_on().await);
    }

    #[tokio::test]
    async fn leaves_agreeing_relay_alone() {
        let device = SimulatedDevice::new();

        let result = enforce(&device, &windows(), utc("2026-10-21T09:00:00Z"))
            .await
            .unwrap();

        assert_eq!(result, Enforcement::InSync { on: false });
        assert_eq!(device.calls().await, vec![METHOD_SWITCH_GET_STATUS]);
    }

    #[tokio::test]
    async fn unreadable_relay_is_not_commanded() {
        let device = SimulatedDevice::new();
        device.fail_call(METHOD_SWITCH_GET_STATUS, 0).await;

        let result = enforce(&device, &windows(), utc("2026-10-21T11:00:00Z")).await;

        assert!(result.is_err());
        assert_eq!(device.count_calls(METHOD_SWITCH_SET).await, 0);
    }
}
