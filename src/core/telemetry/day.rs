//! Calendar-day helpers in the device's local zone.

use chrono::{DateTime, Local, NaiveDate, TimeZone};

/// Day key used for persisted per-day state, e.g. `2026-10-19`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today(now: &DateTime<Local>) -> NaiveDate {
    now.date_naive()
}

/// Local midnight that starts `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Local> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    // A DST jump can skip local midnight; take the first instant that exists.
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&midnight))
}

/// Local midnight that ends `date` (exclusive upper bound of the day).
pub fn end_of_day(date: NaiveDate) -> DateTime<Local> {
    match date.succ_opt() {
        Some(next) => start_of_day(next),
        None => start_of_day(date),
    }
}
