//! Time zone parsing and conversion helpers.
//!
//! - [`parse_zone`]: IANA zone name (e.g. "America/New_York") to [`chrono_tz::Tz`].
//! - [`localize`]: attach a zone to a naive wall-clock timestamp. Ambiguous
//!   times resolve to the earlier instant; times in a gap shift forward.
//! - [`parse_rfc3339_utc`] / [`to_rfc3339_millis`]: the RFC-3339 UTC text form
//!   used for every persisted timestamp.
//!
//! Notes:
//! - Ambiguous local times happen during "fall back" when a wall time occurs twice.
//! - Nonexistent local times happen during "spring forward" when a wall time is skipped.
//! - Persisted timestamps are always UTC with millisecond precision so they
//!   compare correctly as text.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Errors raised while interpreting zone names or wall-clock times.
#[derive(Debug, Error)]
pub enum LocalTimeError {
    /// The zone name is not a known IANA identifier.
    #[error("unknown time zone: {0}")]
    UnknownZone(String),
    /// No valid instant within two hours after a skipped wall time.
    #[error("nonexistent local time {0} in {1}")]
    Nonexistent(NaiveDateTime, Tz),
    /// Text was not a valid RFC-3339 timestamp.
    #[error("bad rfc3339 timestamp: {0}")]
    BadTimestamp(String),
}

/// Parse an IANA zone name.
pub fn parse_zone(name: &str) -> Result<Tz, LocalTimeError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| LocalTimeError::UnknownZone(name.to_string()))
}

/// Interpret a naive wall-clock timestamp in `zone`.
///
/// Ambiguous (fall-back) times take the earlier instant. Nonexistent
/// (spring-forward) times shift forward minute by minute, capped at 2 hours,
/// to the first valid instant.
pub fn localize(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<Tz>, LocalTimeError> {
    use chrono::offset::LocalResult::*;
    match zone.from_local_datetime(&naive) {
        Single(dt) | Ambiguous(dt, _) => Ok(dt),
        None => {
            let mut t = naive;
            for _ in 0..120 {
                t += chrono::Duration::minutes(1);
                if let Single(dt) = zone.from_local_datetime(&t) {
                    return Ok(dt);
                }
            }
            Err(LocalTimeError::Nonexistent(naive, zone))
        }
    }
}

/// RFC-3339 with offset -> UTC.
pub fn parse_rfc3339_utc(s: &str) -> Result<DateTime<Utc>, LocalTimeError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LocalTimeError::BadTimestamp(s.to_string()))
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
