use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single one-minute OHLCV sample.
///
/// The serde field names match the daily-file CSV header
/// (`date,open,high,low,close,volume,barCount`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
  /// Bar start time.
  #[serde(rename = "date")]
  pub timestamp: DateTime<Utc>,
  pub open: f64,
  pub high: f64,
  pub low: f64,
  pub close: f64,
  pub volume: i64,
  #[serde(rename = "barCount")]
  pub bar_count: i64,
}

impl Bar {
  /// Civil date of the bar's start time.
  pub fn trading_date(&self) -> NaiveDate {
    self.timestamp.date_naive()
  }

  /// True when the OHLC relationships hold and nothing is negative.
  pub fn prices_consistent(&self) -> bool {
    self.high >= self.open
      && self.high >= self.close
      && self.high >= self.low
      && self.low <= self.open
      && self.low <= self.close
      && self.open >= 0.0
      && self.high >= 0.0
      && self.low >= 0.0
      && self.close >= 0.0
      && self.volume >= 0
      && self.bar_count >= 0
  }

  /// True when any price field is NaN or infinite.
  pub fn has_missing_values(&self) -> bool {
    !(self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn sample_bar() -> Bar {
    Bar {
      timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
      open: 100.0,
      high: 101.5,
      low: 99.5,
      close: 101.0,
      volume: 1200,
      bar_count: 34,
    }
  }

  #[test]
  fn test_trading_date() {
    let bar = sample_bar();
    assert_eq!(bar.trading_date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
  }

  #[test]
  fn test_prices_consistent_for_valid_bar() {
    assert!(sample_bar().prices_consistent());
  }

  #[test]
  fn test_prices_inconsistent_when_high_below_low() {
    let mut bar = sample_bar();
    bar.high = 99.0;
    assert!(!bar.prices_consistent());
  }

  #[test]
  fn test_prices_inconsistent_when_negative_volume() {
    let mut bar = sample_bar();
    bar.volume = -1;
    assert!(!bar.prices_consistent());
  }

  #[test]
  fn test_missing_values_detects_nan() {
    let mut bar = sample_bar();
    assert!(!bar.has_missing_values());
    bar.close = f64::NAN;
    assert!(bar.has_missing_values());
  }

  #[test]
  fn test_csv_header_field_names() {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.serialize(sample_bar()).unwrap();
    let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
    let header = data.lines().next().unwrap();
    assert_eq!(header, "date,open,high,low,close,volume,barCount");
  }
}
