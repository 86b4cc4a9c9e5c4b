use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Nightly blackout during which no sync runs and the relay is held off.
/// The range `[night_start_hour, night_end_hour)` may wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub night_start_hour: u8,
    pub night_end_hour: u8,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            night_start_hour: 23,
            night_end_hour: 5,
        }
    }
}

impl QuietHours {
    pub fn allows_hour(&self, hour: u32) -> bool {
        !(hour >= u32::from(self.night_start_hour) || hour < u32::from(self.night_end_hour))
    }

    pub fn allows(&self, now: DateTime<Utc>, tz: &Tz) -> bool {
        self.allows_hour(tz.from_utc_datetime(&now.naive_utc()).hour())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_night_hours_across_midnight() {
        let quiet = QuietHours {
            night_start_hour: 23,
            night_end_hour: 5,
        };

        let blocked: Vec<u32> = (0..24).filter(|hour| !quiet.allows_hour(*hour)).collect();

        assert_eq!(blocked, vec![0, 1, 2, 3, 4, 23]);
        assert!((5..=22).all(|hour| quiet.allows_hour(hour)));
    }

    #[test]
    fn start_hour_of_24_disables_blackout() {
        let quiet = QuietHours {
            night_start_hour: 24,
            night_end_hour: 0,
        };
        assert!((0..24).all(|hour| quiet.allows_hour(hour)));
    }

    #[test]
    fn evaluates_hour_in_configured_timezone() {
        let quiet = QuietHours::default();
        let now = DateTime::parse_from_rfc3339("2026-10-21T20:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(quiet.allows(now, &chrono_tz::UTC));
        // 23:30 in Helsinki.
        assert!(!quiet.allows(now, &chrono_tz::Europe::Helsinki));
    }
}
