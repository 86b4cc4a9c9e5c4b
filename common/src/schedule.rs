use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::window::{parse_timestamp, TimeWindow};

pub const SWITCH_SET_METHOD: &str = "Switch.Set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "MON",
            Self::Tue => "TUE",
            Self::Wed => "WED",
            Self::Thu => "THU",
            Self::Fri => "FRI",
            Self::Sat => "SAT",
            Self::Sun => "SUN",
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

/// Weekly recurring trigger: fires every `day` at `hour:minute:second`
/// local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronTrigger {
    pub second: u32,
    pub minute: u32,
    pub hour: u32,
    pub day: DayOfWeek,
}

impl Default for CronTrigger {
    fn default() -> Self {
        Self {
            second: 0,
            minute: 0,
            hour: 0,
            day: DayOfWeek::Mon,
        }
    }
}

impl CronTrigger {
    pub fn from_instant(instant: DateTime<Utc>, tz: &Tz) -> Self {
        let local = tz.from_utc_datetime(&instant.naive_utc());
        Self {
            second: local.second(),
            minute: local.minute(),
            hour: local.hour(),
            day: DayOfWeek::from_chrono(local.weekday()),
        }
    }

    /// Unparseable input falls back to midnight every Monday so one bad
    /// timestamp never aborts a rebuild.
    pub fn from_timestamp(raw: &str, tz: &Tz) -> Self {
        parse_timestamp(raw, tz)
            .map(|instant| Self::from_instant(instant, tz))
            .unwrap_or_default()
    }

    pub fn timespec(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} * * {}",
            self.second,
            self.minute,
            self.hour,
            self.day.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchParams {
    pub id: u8,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCall {
    pub method: String,
    pub params: SwitchParams,
}

/// A schedule entry as sent to the device on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub enable: bool,
    pub timespec: String,
    pub calls: Vec<JobCall>,
}

impl JobSpec {
    pub fn switch(trigger: CronTrigger, switch_id: u8, on: bool) -> Self {
        Self {
            enable: true,
            timespec: trigger.timespec(),
            calls: vec![JobCall {
                method: SWITCH_SET_METHOD.to_string(),
                params: SwitchParams { id: switch_id, on },
            }],
        }
    }
}

/// A schedule entry as listed by the device. Only the id is relied upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleJob {
    pub id: u64,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub timespec: String,
}

/// Two jobs per window, on-trigger first, in window order.
pub fn build_jobs(windows: &[TimeWindow], tz: &Tz, switch_id: u8) -> Vec<JobSpec> {
    windows
        .iter()
        .flat_map(|window| {
            [
                JobSpec::switch(CronTrigger::from_instant(window.on, tz), switch_id, true),
                JobSpec::switch(CronTrigger::from_instant(window.off, tz), switch_id, false),
            ]
        })
        .collect()
}
