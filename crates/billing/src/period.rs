//! Billing-period boundary math.
//!
//! A billing period ends at the first instant of the next calendar month
//! (UTC), regardless of when within a month the bill was opened.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// First instant of the calendar month after `now` (UTC).
///
/// December rolls over to January 1 of the following year. Called exactly at
/// a month boundary, the result is the *next* boundary, never `now` itself.
pub fn next_period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    let boundary = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("the first of a month is always a valid timestamp");

    DateTime::from_naive_utc_and_offset(boundary, Utc)
}
