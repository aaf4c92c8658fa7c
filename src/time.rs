//! Timestamp utilities for nx-core
//!
//! Note timestamps are RFC-3339 with millisecond precision and a `Z` suffix
//! (`2024-03-01T12:00:00.000Z`). Everything that stamps a note goes through
//! `now_millis` so serialized values round-trip exactly.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use regex::Regex;

use crate::error::{NxError, Result};

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*(second|minute|hour|day|week|month|year)s?\s*ago$")
        .expect("relative time regex")
});

/// Current time truncated to millisecond precision
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Truncate a timestamp to millisecond precision
pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(dt.timestamp_millis())
        .single()
        .unwrap_or(dt)
}

/// Format a timestamp as RFC-3339 with milliseconds and `Z` suffix
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC-3339 timestamp (fractional seconds optional)
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NxError::Parse(format!("invalid RFC-3339 timestamp '{}': {}", s, e)))
}

/// Parse a relative time expression such as `3 days ago`
///
/// Month and year units are approximate (30 and 365 days).
pub fn parse_relative(s: &str) -> Result<DateTime<Utc>> {
    let caps = RELATIVE_RE
        .captures(s.trim())
        .ok_or_else(|| NxError::Parse(format!("invalid relative time: {}", s)))?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| NxError::Parse(format!("invalid relative time amount: {}", &caps[1])))?;

    let delta = match &caps[2] {
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" => Duration::weeks(amount),
        "month" => Duration::days(30 * amount),
        "year" => Duration::days(365 * amount),
        unit => return Err(NxError::Parse(format!("unknown time unit: {}", unit))),
    };

    Ok(now_millis() - delta)
}

/// Render a duration compactly: `1h 2m 3s`, `4.500s`, `0s`
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.num_milliseconds().max(0);
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if hours == 0 && minutes == 0 && millis > 0 {
        parts.push(format!("{}.{:03}s", seconds, millis));
    } else if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}s", seconds));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_round_trip() {
        let now = now_millis();
        let rendered = to_rfc3339(now);
        assert!(rendered.ends_with('Z'));
        assert_eq!(parse_rfc3339(&rendered).unwrap(), now);
    }

    #[test]
    fn test_rfc3339_millis_format() {
        let dt = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        assert_eq!(to_rfc3339(dt), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_parse_without_fraction() {
        let dt = parse_rfc3339("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(dt.timestamp(), 1_704_164_645);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::zero()), "0s");
        assert_eq!(format_duration(Duration::milliseconds(4500)), "4.500s");
        assert_eq!(format_duration(Duration::seconds(75)), "1m 15s");
        assert_eq!(
            format_duration(Duration::seconds(3600 + 120 + 3)),
            "1h 2m 3s"
        );
    }

    #[test]
    fn test_parse_relative() {
        let now = now_millis();
        let three_days = parse_relative("3 days ago").unwrap();
        let diff = now - three_days;
        assert!(diff >= Duration::days(3));
        assert!(diff < Duration::days(3) + Duration::seconds(5));

        assert!(parse_relative("yesterday").is_err());
        assert!(parse_relative("3 fortnights ago").is_err());
    }
}
