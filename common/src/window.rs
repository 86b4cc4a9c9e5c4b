use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Layouts accepted for timestamps that carry no UTC offset. Those are read
/// as wall-clock time in the configured timezone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A booking-derived interval during which the relay should be energized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub on: DateTime<Utc>,
    pub off: DateTime<Utc>,
}

impl TimeWindow {
    /// Half-open containment: `on <= now < off`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.on <= now && now < self.off
    }

    pub fn describe(&self, tz: &Tz) -> String {
        let on = self.on.with_timezone(tz);
        let off = self.off.with_timezone(tz);
        format!(
            "ON: {} OFF: {}",
            on.format("%Y-%m-%d %H:%M"),
            off.format("%Y-%m-%d %H:%M")
        )
    }
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("booking response is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("booking response has no `timings` array")]
    MissingTimings,
}

/// Parses an ISO 8601 timestamp. Offset-less values are interpreted in `tz`;
/// a wall-clock time skipped by a DST jump does not parse.
pub fn parse_timestamp(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
}

/// Extracts the raw `timings` entries from a booking response body.
pub fn parse_timings(body: &str) -> Result<Vec<Value>, ResponseError> {
    let mut data: Value = serde_json::from_str(body)?;
    match data.get_mut("timings").map(Value::take) {
        Some(Value::Array(timings)) => Ok(timings),
        _ => Err(ResponseError::MissingTimings),
    }
}

/// Keeps the entries whose `on` and `off` both parse, in input order.
/// Malformed entries are dropped; nothing is sorted, merged or deduplicated.
pub fn validate_windows(raw: &[Value], tz: &Tz) -> Vec<TimeWindow> {
    raw.iter()
        .filter_map(|entry| {
            let on = parse_timestamp(entry.get("on")?.as_str()?, tz)?;
            let off = parse_timestamp(entry.get("off")?.as_str()?, tz)?;
            Some(TimeWindow { on, off })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn parses_offset_and_local_timestamps() {
        let tz = chrono_tz::Europe::Helsinki;

        assert_eq!(
            parse_timestamp("2026-10-21T14:30:00+03:00", &tz),
            Some(utc("2026-10-21T11:30:00Z"))
        );
        assert_eq!(
            parse_timestamp("2026-10-21T11:30:00.000Z", &tz),
            Some(utc("2026-10-21T11:30:00Z"))
        );
        // Helsinki is UTC+3 until the last Sunday of October.
        assert_eq!(
            parse_timestamp("2026-10-21T14:30:00", &tz),
            Some(utc("2026-10-21T11:30:00Z"))
        );
        assert_eq!(
            parse_timestamp("2026-10-21 14:30", &tz),
            Some(utc("2026-10-21T11:30:00Z"))
        );
        assert_eq!(parse_timestamp("tomorrow", &tz), None);
        assert_eq!(parse_timestamp("", &tz), None);
    }

    #[test]
    fn drops_malformed_entries_and_keeps_order() {
        let tz = chrono_tz::UTC;
        let raw = vec![
            json!({"on": "2026-10-22T10:00:00Z", "off": "2026-10-22T12:00:00Z"}),
            json!({"on": "not-a-date", "off": "2026-10-22T13:00:00Z"}),
            json!({"on": "2026-10-20T08:00:00Z", "off": "2026-10-20T09:00:00Z"}),
            json!({"on": "2026-10-23T08:00:00Z"}),
            json!({"on": 17, "off": "2026-10-23T09:00:00Z"}),
            json!("garbage"),
        ];

        let windows = validate_windows(&raw, &tz);

        assert_eq!(
            windows,
            vec![
                TimeWindow {
                    on: utc("2026-10-22T10:00:00Z"),
                    off: utc("2026-10-22T12:00:00Z"),
                },
                TimeWindow {
                    on: utc("2026-10-20T08:00:00Z"),
                    off: utc("2026-10-20T09:00:00Z"),
                },
            ]
        );
    }

    #[test]
    fn empty_input_yields_empty_windows() {
        assert!(validate_windows(&[], &chrono_tz::UTC).is_empty());
    }

    #[test]
    fn does_not_require_on_before_off() {
        let raw = vec![json!({"on": "2026-10-22T12:00:00Z", "off": "2026-10-22T10:00:00Z"})];
        assert_eq!(validate_windows(&raw, &chrono_tz::UTC).len(), 1);
    }

    #[test]
    fn rejects_response_without_timings_array() {
        assert!(matches!(
            parse_timings("<html>busy</html>"),
            Err(ResponseError::NotJson(_))
        ));
        assert!(matches!(
            parse_timings(r#"{"timings": null}"#),
            Err(ResponseError::MissingTimings)
        ));
        assert!(matches!(
            parse_timings(r#"{"data": []}"#),
            Err(ResponseError::MissingTimings)
        ));

        let timings = parse_timings(r#"{"timings": [{"on": "a", "off": "b"}]}"#).unwrap();
        assert_eq!(timings.len(), 1);
    }

    #[test]
    fn window_interval_is_half_open() {
        let window = TimeWindow {
            on: utc("2026-10-22T10:00:00Z"),
            off: utc("2026-10-22T12:00:00Z"),
        };

        assert!(!window.contains(utc("2026-10-22T09:59:59Z")));
        assert!(window.contains(utc("2026-10-22T10:00:00Z")));
        assert!(window.contains(utc("2026-10-22T11:59:59Z")));
        assert!(!window.contains(utc("2026-10-22T12:00:00Z")));
    }

    #[test]
    fn describes_window_in_local_time() {
        let window = TimeWindow {
            on: utc("2026-10-22T10:00:00Z"),
            off: utc("2026-10-22T12:30:00Z"),
        };
        assert_eq!(
            window.describe(&chrono_tz::Europe::Helsinki),
            "ON: 2026-10-22 13:00 OFF: 2026-10-22 15:30"
        );
    }
}
