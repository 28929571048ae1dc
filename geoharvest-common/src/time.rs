//! Timestamp utilities
//!
//! The photo search API reports upload times either as a
//! `YYYY-MM-DD HH:MM:SS` string (UTC) or as unix seconds, depending on the
//! endpoint and the requested extras. Both forms are accepted.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const UPLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Unix epoch, the initial lower bound of every crawl
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse an upload timestamp as returned by the photo search API
pub fn parse_upload_time(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, UPLOAD_TIME_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    let secs: i64 = trimmed
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid upload time: {:?}", value)))?;

    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::InvalidInput(format!("upload time out of range: {}", secs)))
}
