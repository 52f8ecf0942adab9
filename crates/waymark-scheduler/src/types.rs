//! Reminder types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use waymark_geo::Place;

use crate::SchedulerError;

/// A day of the week. Weeks start on Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// All days, Sunday first.
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    /// Days since the start of the week (Sunday = 0).
    pub fn days_from_sunday(self) -> u32 {
        self.to_weekday().num_days_from_sunday()
    }

    pub fn to_weekday(self) -> Weekday {
        match self {
            DayOfWeek::Sunday => Weekday::Sun,
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sun => DayOfWeek::Sunday,
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        };
        f.write_str(name)
    }
}

impl FromStr for DayOfWeek {
    type Err = SchedulerError;

    /// Accepts full names and three-letter abbreviations, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sunday" | "sun" => Ok(DayOfWeek::Sunday),
            "monday" | "mon" => Ok(DayOfWeek::Monday),
            "tuesday" | "tue" => Ok(DayOfWeek::Tuesday),
            "wednesday" | "wed" => Ok(DayOfWeek::Wednesday),
            "thursday" | "thu" => Ok(DayOfWeek::Thursday),
            "friday" | "fri" => Ok(DayOfWeek::Friday),
            "saturday" | "sat" => Ok(DayOfWeek::Saturday),
            _ => Err(SchedulerError::InvalidDayOfWeek(s.to_string())),
        }
    }
}

/// A wall-clock time with second precision.
///
/// Serialized as `"HH:MM:SS"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
    second: u8,
}

impl TimeOfDay {
    /// Create a time of day, rejecting out-of-range components.
    pub fn new(hour: u8, minute: u8, second: u8) -> Result<Self, SchedulerError> {
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(SchedulerError::InvalidTimeOfDay(format!(
                "{hour:02}:{minute:02}:{second:02}"
            )));
        }
        Ok(Self {
            hour,
            minute,
            second,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn to_naive(self) -> NaiveTime {
        // Components are range-checked on construction.
        NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), self.second.into())
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl FromStr for TimeOfDay {
    type Err = SchedulerError;

    /// Parses `HH:MM` or `HH:MM:SS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulerError::InvalidTimeOfDay(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        let field = |p: &str| p.parse::<u8>().map_err(|_| invalid());

        match parts.as_slice() {
            [h, m] => Self::new(field(h)?, field(m)?, 0),
            [h, m, sec] => Self::new(field(h)?, field(m)?, field(sec)?),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = SchedulerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

/// Data-only reference to the listener a reminder fires.
///
/// `key` names a handler registered in a [`crate::ListenerRegistry`] at
/// process start; `params` is handed back to it verbatim on every firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerRef {
    pub key: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ListenerRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// What a reminder waits for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReminderKind {
    /// Fire every week at `day` and `time`.
    Time { day: DayOfWeek, time: TimeOfDay },
    /// Fire on entering `place`, but only on `day`.
    Location { day: DayOfWeek, place: Place },
    /// Fire on entering `place` shortly after `time` on `day`.
    TimeLocation {
        day: DayOfWeek,
        time: TimeOfDay,
        place: Place,
    },
}

impl ReminderKind {
    pub fn day(&self) -> DayOfWeek {
        match self {
            ReminderKind::Time { day, .. }
            | ReminderKind::Location { day, .. }
            | ReminderKind::TimeLocation { day, .. } => *day,
        }
    }

    pub fn time(&self) -> Option<TimeOfDay> {
        match self {
            ReminderKind::Time { time, .. } | ReminderKind::TimeLocation { time, .. } => Some(*time),
            ReminderKind::Location { .. } => None,
        }
    }

    pub fn place(&self) -> Option<&Place> {
        match self {
            ReminderKind::Location { place, .. } | ReminderKind::TimeLocation { place, .. } => {
                Some(place)
            }
            ReminderKind::Time { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReminderKind::Time { .. } => "time",
            ReminderKind::Location { .. } => "location",
            ReminderKind::TimeLocation { .. } => "time-location",
        }
    }
}

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    /// Caller-supplied id. Doubles as the monitored region id.
    pub id: String,
    #[serde(flatten)]
    pub kind: ReminderKind,
    pub listener: ListenerRef,
    pub created_at: DateTime<Utc>,
}

impl ReminderRecord {
    pub fn new(id: impl Into<String>, kind: ReminderKind, listener: ListenerRef) -> Self {
        Self {
            id: id.into(),
            kind,
            listener,
            created_at: Utc::now(),
        }
    }
}
