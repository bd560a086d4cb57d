//! Local-time helpers for the schedule's business day.
//!
//! The visible day changes at 04:00 local time, not at midnight: bookings made
//! at 01:30 still belong to the evening that started the day before.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};

use crate::models::ActiveDate;

/// Hour at which the business day starts.
pub const DAY_START_HOUR: u32 = 4;

/// Number of days shown in the UI.
pub const VISIBLE_DAYS: i64 = 3;

/// Current local time for the configured UTC offset.
pub fn local_now(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Calendar date the timestamp belongs to under the 04:00 day boundary.
pub fn business_date(now: DateTime<FixedOffset>) -> NaiveDate {
    let date = now.date_naive();
    if now.hour() < DAY_START_HOUR {
        date - TimeDelta::days(1)
    } else {
        date
    }
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `D.M` without zero padding, e.g. `7.3`.
pub fn display_date(date: NaiveDate) -> String {
    format!("{}.{}", date.day(), date.month())
}

/// Display form of a day-key; malformed keys are returned unchanged.
pub fn display_from_key(key: &str) -> String {
    NaiveDate::parse_from_str(key, "%Y-%m-%d")
        .map(display_date)
        .unwrap_or_else(|_| key.to_string())
}

/// The three visible days starting at the current business date.
pub fn next_three_dates(now: DateTime<FixedOffset>) -> Vec<ActiveDate> {
    let start = business_date(now);
    (0..VISIBLE_DAYS)
        .map(|i| {
            let date = start + TimeDelta::days(i);
            ActiveDate {
                key: day_key(date),
                display: display_date(date),
            }
        })
        .collect()
}

/// Time left until the next 04:00 local.
pub fn next_rollover_delay(now: DateTime<FixedOffset>) -> std::time::Duration {
    let boundary = NaiveTime::from_hms_opt(DAY_START_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date_naive().and_time(boundary);
    if now.naive_local() >= next {
        next += TimeDelta::days(1);
    }
    (next - now.naive_local())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
