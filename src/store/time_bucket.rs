//! Date and timestamp encoding for the database
//!
//! - Day buckets: "YYYY-MM-DD" TEXT columns
//! - Timestamps: Unix milliseconds INTEGER columns

use chrono::{DateTime, NaiveDate, Utc};

/// Day bucket string for a calendar date.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use questlog::store::day_bucket;
///
/// let day = NaiveDate::from_ymd_opt(2023, 12, 28).unwrap();
/// assert_eq!(day_bucket(day), "2023-12-28");
/// ```
pub fn day_bucket(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a day bucket string back to a date.
pub fn parse_day_bucket(bucket: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(bucket, "%Y-%m-%d").ok()
}

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Out-of-range values fall back to the epoch
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
