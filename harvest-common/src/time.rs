//! Timestamp utilities
//!
//! All record timestamps are Unix seconds (`i64`). Zero is reserved for
//! "open-ended" membership boundaries.

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as Unix seconds
pub fn now_timestamp() -> i64 {
    now().timestamp()
}

/// Parse a date as used in default data (`2011-Apr-21`, `2011-04-21`) or the
/// literal `now` into Unix seconds at midnight UTC.
pub fn date_to_timestamp(date: &str) -> Result<i64> {
    let date = date.trim();
    if date.eq_ignore_ascii_case("now") {
        return Ok(now_timestamp());
    }

    let parsed = NaiveDate::parse_from_str(date, "%Y-%b-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .map_err(|e| Error::InvalidInput(format!("Unparseable date '{}': {}", date, e)))?;

    parsed
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| Error::InvalidInput(format!("Invalid date '{}'", date)))
}
