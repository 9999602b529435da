// SPDX-License-Identifier: MIT

//! Shared helpers for date/time formatting and arithmetic.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current UTC calendar day.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Whole minutes between two instants, rounded to the nearest minute with a
/// floor of zero.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let seconds = end.signed_duration_since(start).num_seconds().max(0);
    (seconds as f64 / 60.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minutes_between_rounds_to_nearest() {
        let start = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();

        let end = Utc.with_ymd_and_hms(2025, 1, 20, 12, 10, 29).unwrap();
        assert_eq!(minutes_between(start, end), 10);

        let end = Utc.with_ymd_and_hms(2025, 1, 20, 12, 10, 31).unwrap();
        assert_eq!(minutes_between(start, end), 11);
    }

    #[test]
    fn test_minutes_between_floors_at_zero() {
        let start = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 20, 11, 0, 0).unwrap();
        assert_eq!(minutes_between(start, end), 0);
    }

    #[test]
    fn test_format_utc_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 20, 12, 30, 5).unwrap();
        assert_eq!(format_utc_rfc3339(ts), "2025-01-20T12:30:05Z");
    }
}
