use chrono::{Datelike, Months, NaiveDate};

use crate::error::EntryError;
use crate::types::{MAX_NUMBER, MIN_NUMBER, NUMBERS_PER_LINE, Numbers};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_draw_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).ok()
}

pub fn format_draw_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Last calendar day of the month after `date`: 2025-06-30 -> 2025-07-31.
pub fn last_day_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    let after_next = first.checked_add_months(Months::new(2))?;
    after_next.pred_opt()
}

/// Checks a ticket line and returns it sorted ascending.
pub fn validate_numbers(numbers: &[i64]) -> Result<Numbers, EntryError> {
    if numbers.len() != NUMBERS_PER_LINE {
        return Err(EntryError::InvalidNumbers(format!(
            "expected {} numbers, got {}",
            NUMBERS_PER_LINE,
            numbers.len()
        )));
    }

    let mut line = [0u8; NUMBERS_PER_LINE];
    for (slot, &n) in line.iter_mut().zip(numbers) {
        if n < MIN_NUMBER as i64 || n > MAX_NUMBER as i64 {
            return Err(EntryError::InvalidNumbers(format!(
                "{} is outside {}-{}",
                n, MIN_NUMBER, MAX_NUMBER
            )));
        }
        *slot = n as u8;
    }

    line.sort_unstable();
    if line.windows(2).any(|w| w[0] == w[1]) {
        return Err(EntryError::InvalidNumbers(format!(
            "numbers must be distinct: {:?}",
            numbers
        )));
    }

    Ok(line)
}

pub fn numbers_to_string(numbers: &Numbers) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn numbers_from_string(raw: &str) -> Option<Numbers> {
    let parsed = raw
        .split(',')
        .map(|n| n.trim().parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    validate_numbers(&parsed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_draw_date(s).unwrap()
    }

    #[test]
    fn test_last_day_of_next_month() {
        assert_eq!(last_day_of_next_month(date("2025-06-30")), Some(date("2025-07-31")));
        assert_eq!(last_day_of_next_month(date("2025-01-31")), Some(date("2025-02-28")));
        assert_eq!(last_day_of_next_month(date("2024-01-15")), Some(date("2024-02-29")));
        assert_eq!(last_day_of_next_month(date("2025-11-30")), Some(date("2025-12-31")));
        assert_eq!(last_day_of_next_month(date("2025-12-31")), Some(date("2026-01-31")));
    }

    #[test]
    fn test_validate_sorts() {
        assert_eq!(validate_numbers(&[5, 1, 20, 9]).unwrap(), [1, 5, 9, 20]);
    }

    #[test]
    fn test_validate_rejects_bad_lines() {
        assert!(validate_numbers(&[1, 2, 3]).is_err());
        assert!(validate_numbers(&[1, 2, 3, 4, 5]).is_err());
        assert!(validate_numbers(&[0, 2, 3, 4]).is_err());
        assert!(validate_numbers(&[1, 2, 3, 33]).is_err());
        assert!(validate_numbers(&[7, 2, 7, 4]).is_err());
    }

    #[test]
    fn test_numbers_string_round_trip() {
        let line = [3, 7, 15, 22];
        assert_eq!(numbers_to_string(&line), "3,7,15,22");
        assert_eq!(numbers_from_string("22,3,15,7"), Some(line));
        assert_eq!(numbers_from_string("3,7,x,22"), None);
    }

    #[test]
    fn test_parse_draw_date() {
        assert!(parse_draw_date("2025-06-30").is_some());
        assert!(parse_draw_date("30/06/2025").is_none());
        assert_eq!(format_draw_date(date(" 2025-06-30 ")), "2025-06-30");
    }
}
