//! Timestamp contract of the ads API.
//!
//! Conversion times travel as `"YYYY-MM-DD HH:MM:SS±HH:MM"`. The offset is
//! always present with a colon, including `+00:00` for UTC. Wall-clock inputs
//! without a zone are read in the account's configured IANA zone.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use shared_utils::tz::{LocalTimeError, localize};
use tracing::warn;

const ADS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Render `dt` in the ads wire format, keeping its own offset.
///
/// ```
/// use ad_conversions::datetime::format_ads_datetime;
/// use chrono::{TimeZone, Utc};
///
/// let dt = Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap();
/// assert_eq!(format_ads_datetime(&dt), "2025-01-10 15:00:00+00:00");
/// ```
pub fn format_ads_datetime<Z: TimeZone>(dt: &DateTime<Z>) -> String
where
    Z::Offset: Display,
{
    dt.format(ADS_FORMAT).to_string()
}

/// Attach `zone` to a wall-clock time; DST gaps shift forward, ambiguous
/// times take the earlier instant.
pub fn assume_zone(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<FixedOffset>, LocalTimeError> {
    localize(naive, zone).map(|dt| dt.fixed_offset())
}

/// Conversion time for an order.
///
/// `raw` is tried as RFC-3339 first, then as a zone-less ISO timestamp read in
/// `zone`. Missing or unreadable input falls back to `fallback` shown in `zone`.
pub fn resolve_conversion_time(
    raw: Option<&str>,
    fallback: DateTime<Utc>,
    zone: Tz,
) -> DateTime<FixedOffset> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return fallback.with_timezone(&zone).fixed_offset();
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt;
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok());
    match naive.map(|n| assume_zone(n, zone)) {
        Some(Ok(dt)) => dt,
        _ => {
            warn!(kind = "malformed_upstream", value = raw, "unreadable completion time; using now");
            fallback.with_timezone(&zone).fixed_offset()
        }
    }
}
