//! Instant parsing and formatting.
//!
//! Two precisions are in play: resolution compares full timestamps, while
//! change detection and display work at calendar-day granularity (UTC).

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::AsofError;

/// Parse a user-supplied as-of instant.
///
/// Accepts RFC 3339 (`2024-02-01T09:30:00+02:00`), a naive date-time taken
/// as UTC (`2024-02-01T09:30` or `2024-02-01T09:30:00`), or a bare calendar
/// date taken as UTC midnight (`2024-02-01`).
///
/// # Errors
///
/// Returns [`AsofError::InvalidInstant`] when no format matches.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, AsofError> {
    let trimmed = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AsofError::InvalidInstant(trimmed.to_string()))
}

/// RFC 3339 with second precision and a `Z` suffix.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `YYYY-MM-DD` of the UTC calendar day.
#[must_use]
pub fn format_day(ts: DateTime<Utc>) -> String {
    ts.date_naive().format("%Y-%m-%d").to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bare_date_is_utc_midnight() {
        let ts = parse_instant("2024-02-01").expect("parse date");
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).single().expect("valid time"));
    }

    #[test]
    fn rfc3339_offset_is_normalized() {
        let ts = parse_instant("2024-02-01T09:30:00+02:00").expect("parse rfc3339");
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 2, 1, 7, 30, 0).single().expect("valid time"));
    }

    #[test]
    fn naive_minutes_are_accepted() {
        let ts = parse_instant("2024-01-01T10:00").expect("parse naive");
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).single().expect("valid time"));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_instant("last tuesday").expect_err("should fail");
        assert!(matches!(err, AsofError::InvalidInstant(ref s) if s == "last tuesday"));
    }

    #[test]
    fn timestamp_format_is_seconds_z() {
        let ts = parse_instant("2024-03-01T09:00:00.123Z").expect("parse");
        assert_eq!(format_timestamp(ts), "2024-03-01T09:00:00Z");
        assert_eq!(format_day(ts), "2024-03-01");
    }
}
