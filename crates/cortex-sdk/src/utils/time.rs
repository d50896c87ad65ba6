//! Time Utilities
//!
//! Tier tables store timestamps as epoch milliseconds.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to epoch milliseconds for storage
pub fn to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert stored epoch milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
