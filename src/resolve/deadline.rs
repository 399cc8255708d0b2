//! Deadline parsing.
//!
//! Patterns are checked in a fixed order and the first match wins; every
//! result lands at 23:59:59 of the resolved day. Unrecognized non-empty
//! input falls back to one week out, with a warning.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

fn in_days_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^in (\d+) days?$").unwrap())
}

fn slash_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap())
}

fn dash_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").unwrap())
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

/// Parse a free-text deadline relative to `today`. Returns `None` for empty
/// input; anything else resolves to some end-of-day timestamp.
pub fn parse_deadline(input: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let normalized = input.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let date = recognize(&normalized, today).unwrap_or_else(|| {
        warn!("Unrecognized deadline format: {:?}, defaulting to one week", input);
        plus_days(today, 7)
    });

    date.and_hms_opt(23, 59, 59)
}

fn recognize(normalized: &str, today: NaiveDate) -> Option<NaiveDate> {
    if iso_date_re().is_match(normalized) {
        return NaiveDate::parse_from_str(normalized, "%Y-%m-%d").ok();
    }

    if let Some(captures) = slash_date_re().captures(normalized) {
        return month_day_year(&captures);
    }

    if let Some(captures) = dash_date_re().captures(normalized) {
        return month_day_year(&captures);
    }

    if normalized.contains("tomorrow") {
        return Some(plus_days(today, 1));
    }

    if normalized.contains("next week") {
        return Some(plus_days(today, 7));
    }

    if let Some(captures) = in_days_re().captures(normalized) {
        let days: u64 = captures[1].parse().ok()?;
        return today.checked_add_days(Days::new(days));
    }

    if normalized.contains("end of month") {
        return Some(last_day_of_month(today));
    }

    if normalized.contains("end of week") {
        // Upcoming Sunday; a Sunday resolves to itself.
        let until_sunday = 7 - today.weekday().number_from_monday() as u64;
        return Some(plus_days(today, until_sunday));
    }

    None
}

fn month_day_year(captures: &regex::Captures<'_>) -> Option<NaiveDate> {
    let month: u32 = captures[1].parse().ok()?;
    let day: u32 = captures[2].parse().ok()?;
    let year: i32 = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn plus_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

fn last_day_of_month(today: NaiveDate) -> NaiveDate {
    let first = today.with_day(1).unwrap_or(today);
    let next_month = first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(first);
    next_month.pred_opt().unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        // A Wednesday.
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn eod(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap()
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(parse_deadline("2025-02-01", today()), Some(eod(2025, 2, 1)));
    }

    #[test]
    fn test_slash_date_is_month_first() {
        assert_eq!(parse_deadline("2/1/2025", today()), Some(eod(2025, 2, 1)));
        assert_eq!(parse_deadline("12/31/2025", today()), Some(eod(2025, 12, 31)));
    }

    #[test]
    fn test_dash_date_is_month_first() {
        assert_eq!(parse_deadline("2-1-2025", today()), Some(eod(2025, 2, 1)));
    }

    #[test]
    fn test_tomorrow() {
        assert_eq!(parse_deadline("tomorrow", today()), Some(eod(2025, 1, 16)));
        assert_eq!(
            parse_deadline("by tomorrow noon", today()),
            Some(eod(2025, 1, 16))
        );
    }

    #[test]
    fn test_next_week() {
        assert_eq!(parse_deadline("next week", today()), Some(eod(2025, 1, 22)));
    }

    #[test]
    fn test_in_n_days() {
        assert_eq!(parse_deadline("in 3 days", today()), Some(eod(2025, 1, 18)));
        assert_eq!(parse_deadline("in 1 day", today()), Some(eod(2025, 1, 16)));
    }

    #[test]
    fn test_end_of_month() {
        assert_eq!(
            parse_deadline("end of month", today()),
            Some(eod(2025, 1, 31))
        );
        // February of a non-leap year.
        let feb = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        assert_eq!(parse_deadline("end of month", feb), Some(eod(2025, 2, 28)));
    }

    #[test]
    fn test_end_of_week_is_upcoming_sunday() {
        assert_eq!(
            parse_deadline("end of week", today()),
            Some(eod(2025, 1, 19))
        );
        // On a Sunday, end of week is that same day.
        let sunday = NaiveDate::from_ymd_opt(2025, 1, 19).unwrap();
        assert_eq!(parse_deadline("end of week", sunday), Some(eod(2025, 1, 19)));
    }

    #[test]
    fn test_unrecognized_defaults_to_one_week() {
        assert_eq!(
            parse_deadline("next quarter", today()),
            Some(eod(2025, 1, 22))
        );
    }

    #[test]
    fn test_invalid_calendar_date_defaults() {
        // 2/30 does not exist; falls through to the one-week default.
        assert_eq!(parse_deadline("2/30/2025", today()), Some(eod(2025, 1, 22)));
    }

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(parse_deadline("", today()), None);
        assert_eq!(parse_deadline("   ", today()), None);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(parse_deadline("Tomorrow", today()), Some(eod(2025, 1, 16)));
        assert_eq!(parse_deadline("IN 3 DAYS", today()), Some(eod(2025, 1, 18)));
    }
}
