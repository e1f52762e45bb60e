//! Lenient date parsing and prescription end-date arithmetic.
//!
//! End dates are computed here, deterministically, never delegated to the
//! model. Malformed inputs degrade to `None` instead of failing the record.

use chrono::{Datelike, Duration, NaiveDate};

/// Formats accepted when parsing model-supplied dates, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse any common date representation. Datetime strings are accepted by
/// their date prefix.
pub fn parse_date_lenient(input: &str) -> Option<NaiveDate> {
    let cleaned = input.trim();
    if cleaned.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, fmt) {
            return Some(date);
        }
    }

    // ISO datetime like "2024-03-20T10:00:00" or "2024-03-20 10:00:00"
    cleaned
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Compute a prescription's end date from its start date and a duration
/// string like "10 days", "2 weeks" or "6 months".
///
/// The duration must be exactly two whitespace-separated tokens (amount,
/// unit). Unrecognized units or malformed durations yield `None`.
pub fn compute_end_date(start_date: &str, duration: &str) -> Option<NaiveDate> {
    let start = parse_date_lenient(start_date)?;

    let normalized = duration.trim().to_lowercase();
    let parts: Vec<&str> = normalized.split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }

    let amount: i64 = parts[0].parse().ok()?;
    let unit = parts[1];

    if unit.contains("month") {
        add_months(start, amount)
    } else if unit.contains("week") {
        start.checked_add_signed(Duration::weeks(amount))
    } else if unit.contains("day") {
        start.checked_add_signed(Duration::days(amount))
    } else {
        None
    }
}

/// Calendar-month addition with year rollover. The day of month is kept
/// only where the target month has it (Jan 31 + 1 month has no valid day).
fn add_months(start: NaiveDate, amount: i64) -> Option<NaiveDate> {
    let zero_based = i64::from(start.month0()) + amount;
    let year = start.year() + i32::try_from(zero_based.div_euclid(12)).ok()?;
    let month = u32::try_from(zero_based.rem_euclid(12) + 1).ok()?;
    NaiveDate::from_ymd_opt(year, month, start.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── compute_end_date ──

    #[test]
    fn days_added() {
        assert_eq!(
            compute_end_date("2024-03-20", "10 days"),
            Some(date(2024, 3, 30))
        );
    }

    #[test]
    fn weeks_added() {
        assert_eq!(
            compute_end_date("2024-03-20", "2 weeks"),
            Some(date(2024, 4, 3))
        );
    }

    #[test]
    fn months_added_within_year() {
        assert_eq!(
            compute_end_date("2024-01-15", "6 months"),
            Some(date(2024, 7, 15))
        );
    }

    #[test]
    fn months_roll_over_year_boundary() {
        assert_eq!(
            compute_end_date("2024-11-01", "3 months"),
            Some(date(2025, 2, 1))
        );
        assert_eq!(
            compute_end_date("2024-12-15", "1 month"),
            Some(date(2025, 1, 15))
        );
        assert_eq!(
            compute_end_date("2023-06-10", "18 months"),
            Some(date(2024, 12, 10))
        );
    }

    #[test]
    fn malformed_duration_is_none() {
        assert_eq!(compute_end_date("2024-03-20", "not-a-duration"), None);
        assert_eq!(compute_end_date("2024-03-20", "10"), None);
        assert_eq!(compute_end_date("2024-03-20", "10 days tops"), None);
        assert_eq!(compute_end_date("2024-03-20", ""), None);
        assert_eq!(compute_end_date("2024-03-20", "ten days"), None);
    }

    #[test]
    fn unknown_unit_is_none() {
        assert_eq!(compute_end_date("2024-03-20", "10 fortnights"), None);
        assert_eq!(compute_end_date("2024-03-20", "2 hours"), None);
    }

    #[test]
    fn bad_start_date_is_none() {
        assert_eq!(compute_end_date("someday", "10 days"), None);
        assert_eq!(compute_end_date("", "10 days"), None);
    }

    #[test]
    fn unit_matching_is_case_insensitive_and_plural_agnostic() {
        assert_eq!(
            compute_end_date("2024-03-20", "1 Day"),
            Some(date(2024, 3, 21))
        );
        assert_eq!(
            compute_end_date("2024-03-20", "3 WEEKS"),
            Some(date(2024, 4, 10))
        );
        assert_eq!(
            compute_end_date("2024-01-15", "1 month"),
            Some(date(2024, 2, 15))
        );
    }

    #[test]
    fn day_overflow_in_target_month_is_none() {
        // Jan 31 + 1 month → Feb 31 does not exist
        assert_eq!(compute_end_date("2024-01-31", "1 month"), None);
        // Leap day + 12 months → Feb 29, 2025 does not exist
        assert_eq!(compute_end_date("2024-02-29", "12 months"), None);
    }

    #[test]
    fn deterministic() {
        let a = compute_end_date("2024-03-20", "10 days");
        let b = compute_end_date("2024-03-20", "10 days");
        assert_eq!(a, b);
    }

    // ── parse_date_lenient ──

    #[test]
    fn parses_iso() {
        assert_eq!(parse_date_lenient("2024-03-20"), Some(date(2024, 3, 20)));
    }

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse_date_lenient("2024/03/20"), Some(date(2024, 3, 20)));
        assert_eq!(parse_date_lenient("20/03/2024"), Some(date(2024, 3, 20)));
        assert_eq!(parse_date_lenient("20-03-2024"), Some(date(2024, 3, 20)));
        assert_eq!(parse_date_lenient("20.03.2024"), Some(date(2024, 3, 20)));
        assert_eq!(
            parse_date_lenient("March 20, 2024"),
            Some(date(2024, 3, 20))
        );
        assert_eq!(parse_date_lenient("20 March 2024"), Some(date(2024, 3, 20)));
    }

    #[test]
    fn parses_datetime_prefix() {
        assert_eq!(
            parse_date_lenient("2024-03-20T10:30:00"),
            Some(date(2024, 3, 20))
        );
        assert_eq!(
            parse_date_lenient("2024-03-20 10:30:00"),
            Some(date(2024, 3, 20))
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date_lenient("yesterday"), None);
        assert_eq!(parse_date_lenient(""), None);
        assert_eq!(parse_date_lenient("   "), None);
    }
}
