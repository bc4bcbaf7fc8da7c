//! Date handling for edition lookup and watermark text

use chrono::{DateTime, NaiveDate, TimeZone};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::Display;

/// Edition dates are keyed as `dd-MM-yyyy` by the feed.
pub const EDITION_DATE_FORMAT: &str = "%d-%m-%Y";

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// en-US `toLocaleString` layout, e.g. `3/5/2024, 9:07:03 AM`
const LOCALIZED_TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

lazy_static! {
    static ref ISO_DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref EDITION_DATE_RE: Regex = Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap();
}

pub fn format_edition_date(date: NaiveDate) -> String {
    date.format(EDITION_DATE_FORMAT).to_string()
}

pub fn parse_edition_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), EDITION_DATE_FORMAT).ok()
}

/// Parse a date supplied by a caller, accepting ISO `yyyy-MM-dd` as well as
/// the feed's own `dd-MM-yyyy`. Years must have four digits.
pub fn parse_date_input(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if ISO_DATE_RE.is_match(value) {
        NaiveDate::parse_from_str(value, ISO_DATE_FORMAT).ok()
    } else if EDITION_DATE_RE.is_match(value) {
        parse_edition_date(value)
    } else {
        None
    }
}

pub fn localized_timestamp<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    timestamp.format(LOCALIZED_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use proptest::prelude::*;

    #[test]
    fn test_format_edition_date_is_day_month_year() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(format_edition_date(date), "05-03-2024");
    }

    #[test]
    fn test_parse_date_input_accepts_both_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_date_input("2024-03-05"), expected);
        assert_eq!(parse_date_input("05-03-2024"), expected);
        assert_eq!(parse_date_input("March 5"), None);
    }

    #[test]
    fn test_parse_date_input_rejects_short_years() {
        assert_eq!(parse_date_input("10-11-12"), None);
        assert_eq!(parse_date_input("24-03-05"), None);
        assert_eq!(parse_date_input("5-3-2024"), None);
        assert_eq!(parse_date_input("2024-3-5"), None);
        assert_eq!(
            parse_date_input(" 2024-03-05 "),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_localized_timestamp_matches_en_us_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 21, 7, 3).unwrap();
        assert_eq!(localized_timestamp(&ts), "3/5/2024, 9:07:03 PM");

        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let morning = ist.with_ymd_and_hms(2024, 12, 25, 0, 30, 0).unwrap();
        assert_eq!(localized_timestamp(&morning), "12/25/2024, 12:30:00 AM");
    }

    proptest! {
        #[test]
        fn edition_date_round_trips(days in 0i64..40_000) {
            let date = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap() + chrono::Duration::days(days);
            let key = format_edition_date(date);
            prop_assert_eq!(key.len(), 10);
            prop_assert_eq!(parse_edition_date(&key), Some(date));
        }
    }
}
