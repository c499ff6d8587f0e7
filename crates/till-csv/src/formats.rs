//! Cell-level parsers for dates, times, currency amounts and counts.
//!
//! Exports from point-of-sale and payroll systems disagree on almost every
//! format, so each parser tries a fixed list of layouts in order.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// A calendar date, optionally with the time of day when the cell carried
/// a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
  pub date: NaiveDate,
  pub time: Option<NaiveTime>,
}

impl ParsedDate {
  pub fn at(&self, time: Option<NaiveTime>) -> NaiveDateTime {
    self.date.and_time(time.or(self.time).unwrap_or(NaiveTime::MIN))
  }
}

/// Date-only layouts. Day-first precedes month-first, so `03/04/2024` is
/// 3 April.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

const TIMESTAMP_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%d/%m/%Y %H:%M:%S",
  "%d/%m/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p", "%I:%M:%S %p"];

pub fn parse_date(s: &str) -> Option<ParsedDate> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }

  for format in DATE_FORMATS {
    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
      return Some(ParsedDate { date, time: None });
    }
  }
  for format in TIMESTAMP_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
      return Some(ParsedDate { date: dt.date(), time: Some(dt.time()) });
    }
  }
  // Offsets are dropped: the venue's wall-clock time is what matters.
  DateTime::parse_from_rfc3339(s).ok().map(|dt| {
    let local = dt.naive_local();
    ParsedDate { date: local.date(), time: Some(local.time()) }
  })
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
  let s = s.trim();
  let upper = s.to_ascii_uppercase();
  TIME_FORMATS
    .iter()
    .find_map(|format| NaiveTime::parse_from_str(&upper, format).ok())
}

/// Parse a currency amount: every `$` and every `,` grouping separator is
/// removed before decimal conversion.
pub fn parse_amount(s: &str) -> Option<Decimal> {
  let cleaned: String = s
    .trim()
    .chars()
    .filter(|c| *c != '$' && *c != ',')
    .collect();
  let cleaned = cleaned.trim();
  if cleaned.is_empty() {
    return None;
  }
  Decimal::from_str(cleaned).ok()
}

/// A non-negative whole number, tolerating grouping separators.
pub fn parse_count(s: &str) -> Option<i64> {
  let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
  cleaned.parse::<i64>().ok().filter(|n| *n >= 0)
}
