//! Weekly schedule resolution.
//!
//! All arithmetic is on naive local date-times. The caller's calendar is used
//! as-is; no timezone conversion happens here.

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::{DayOfWeek, TimeOfDay};

/// The day of the week `now` falls on.
pub fn day_of_week(now: NaiveDateTime) -> DayOfWeek {
    now.weekday().into()
}

/// Next timestamp strictly after `now` that falls on `day` at `time`.
///
/// Builds the candidate on `day` within `now`'s Sunday-to-Saturday week. A
/// candidate at or before `now` is pushed forward by exactly seven days, so
/// the result always lies in `(now, now + 7 days]`.
pub fn next_occurrence(day: DayOfWeek, time: TimeOfDay, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date();
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
    let target_date = week_start + Duration::days(i64::from(day.days_from_sunday()));
    let candidate = target_date.and_time(time.to_naive());

    if candidate <= now {
        candidate + Duration::days(7)
    } else {
        candidate
    }
}
