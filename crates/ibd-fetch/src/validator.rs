//! Day-level bar validation.
//!
//! Five checks run in order; the first failure blocks the write. Soft
//! findings (irregular intervals, zero volume, extreme moves, duplicated
//! consecutive bars) are logged as warnings without failing the day.

use chrono::NaiveDate;
use ibd_core::{Bar, MarketCalendar};
use tracing::{debug, warn};

/// Result of validating one day of bars.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
  pub is_valid: bool,
  pub message: String,
  pub error_details: Vec<String>,
  pub validated_bars: usize,
  pub expected_bars: Option<u32>,
}

impl ValidationOutcome {
  fn passed(message: impl Into<String>, validated_bars: usize, expected_bars: Option<u32>) -> Self {
    Self {
      is_valid: true,
      message: message.into(),
      error_details: Vec::new(),
      validated_bars,
      expected_bars,
    }
  }

  fn failed(message: impl Into<String>, details: Vec<String>, validated_bars: usize) -> Self {
    Self {
      is_valid: false,
      message: message.into(),
      error_details: details,
      validated_bars,
      expected_bars: None,
    }
  }
}

/// Validates a fetched day against structural, price, time-sequence,
/// calendar, and quality rules.
#[derive(Debug, Clone)]
pub struct BarValidator {
  calendar: MarketCalendar,
}

impl BarValidator {
  pub fn new(calendar: MarketCalendar) -> Self {
    Self { calendar }
  }

  /// Run all checks for `symbol` on `date`.
  pub fn validate_day(&self, bars: &[Bar], symbol: &str, date: NaiveDate) -> ValidationOutcome {
    debug!("Starting validation for {} on {}", symbol, date);

    // 1. Structure: an empty day is valid (possible holiday).
    if bars.is_empty() {
      return ValidationOutcome::passed("Empty dataset (possible holiday)", 0, None);
    }

    // 2. Per-bar price and volume sanity.
    let bar_result = self.check_bars(bars);
    if !bar_result.is_valid {
      return bar_result;
    }

    // 3. Time sequence.
    let time_result = self.check_time_sequence(bars);
    if !time_result.is_valid {
      return time_result;
    }

    // 4. Calendar bar count.
    let calendar_result = self.check_calendar(bars, date);
    if !calendar_result.is_valid {
      return calendar_result;
    }
    let expected_bars = calendar_result.expected_bars;

    // 5. Data quality.
    let quality_result = self.check_quality(bars);
    if !quality_result.is_valid {
      return quality_result;
    }

    debug!("All validations passed for {} on {}", symbol, date);
    ValidationOutcome::passed("All validations passed", bars.len(), expected_bars)
  }

  fn check_bars(&self, bars: &[Bar]) -> ValidationOutcome {
    let mut errors = Vec::new();

    let high_low = bars.iter().filter(|b| b.high < b.low).count();
    if high_low > 0 {
      errors.push(format!("High < Low in {high_low} bars"));
    }
    let high_open = bars.iter().filter(|b| b.high < b.open).count();
    if high_open > 0 {
      errors.push(format!("High < Open in {high_open} bars"));
    }
    let high_close = bars.iter().filter(|b| b.high < b.close).count();
    if high_close > 0 {
      errors.push(format!("High < Close in {high_close} bars"));
    }
    let low_open = bars.iter().filter(|b| b.low > b.open).count();
    if low_open > 0 {
      errors.push(format!("Low > Open in {low_open} bars"));
    }
    let low_close = bars.iter().filter(|b| b.low > b.close).count();
    if low_close > 0 {
      errors.push(format!("Low > Close in {low_close} bars"));
    }

    let negative_prices = bars
      .iter()
      .filter(|b| b.open < 0.0 || b.high < 0.0 || b.low < 0.0 || b.close < 0.0)
      .count();
    if negative_prices > 0 {
      errors.push(format!("Negative prices in {negative_prices} bars"));
    }

    let zero_prices = bars
      .iter()
      .filter(|b| b.open == 0.0 || b.high == 0.0 || b.low == 0.0 || b.close == 0.0)
      .count();
    if zero_prices > 0 {
      warn!("Zero prices found in {} bars", zero_prices);
    }

    let negative_volume = bars.iter().filter(|b| b.volume < 0).count();
    if negative_volume > 0 {
      errors.push(format!("Negative volume in {negative_volume} bars"));
    }
    let negative_bar_count = bars.iter().filter(|b| b.bar_count < 0).count();
    if negative_bar_count > 0 {
      errors.push(format!("Negative barCount in {negative_bar_count} bars"));
    }

    if !errors.is_empty() {
      return ValidationOutcome::failed(
        format!("Bar validation errors: {}", errors.join("; ")),
        errors,
        bars.len(),
      );
    }
    ValidationOutcome::passed("Individual bar validation passed", bars.len(), None)
  }

  fn check_time_sequence(&self, bars: &[Bar]) -> ValidationOutcome {
    let mut duplicates = 0;
    let mut out_of_order = 0;
    let mut irregular_intervals = 0;

    for pair in bars.windows(2) {
      let delta = pair[1].timestamp - pair[0].timestamp;
      if delta == chrono::Duration::zero() {
        duplicates += 1;
      } else if delta < chrono::Duration::zero() {
        out_of_order += 1;
      } else if delta != chrono::Duration::minutes(1) {
        irregular_intervals += 1;
      }
    }

    if duplicates > 0 {
      return ValidationOutcome::failed(
        format!("Found {duplicates} duplicate timestamps"),
        vec![format!("duplicate_timestamps: {duplicates}")],
        bars.len(),
      );
    }
    if out_of_order > 0 {
      return ValidationOutcome::failed(
        "Timestamps are not in ascending order",
        vec!["non_sequential_timestamps".to_string()],
        bars.len(),
      );
    }
    if irregular_intervals > 0 {
      // Acceptable across market gaps; noted but not failed.
      warn!("Found {} irregular time intervals", irregular_intervals);
    }

    ValidationOutcome::passed("Time sequence validation passed", bars.len(), None)
  }

  fn check_calendar(&self, bars: &[Bar], date: NaiveDate) -> ValidationOutcome {
    let schedule = self.calendar.schedule(date);
    let actual = bars.len() as u32;
    let expected = schedule.expected_bars;

    if actual == expected {
      return ValidationOutcome::passed(
        format!("Bar count validation passed: {actual} bars ({})", schedule.kind),
        bars.len(),
        Some(expected),
      );
    }

    // The two early-close session lengths are accepted unconditionally;
    // the gateway's notion of the session beats a stale calendar.
    if self.calendar.expected_bars().early_close.contains(&actual) {
      return ValidationOutcome::passed(
        format!("Bar count validation passed: {actual} bars (early_close)"),
        bars.len(),
        Some(actual),
      );
    }

    let mut outcome = ValidationOutcome::failed(
      format!("Bar count mismatch: expected {expected}, got {actual} ({})", schedule.kind),
      vec![
        format!("expected_bars: {expected}"),
        format!("actual_bars: {actual}"),
        format!("market_type: {}", schedule.kind),
      ],
      bars.len(),
    );
    outcome.expected_bars = Some(expected);
    outcome
  }

  fn check_quality(&self, bars: &[Bar]) -> ValidationOutcome {
    let missing = bars.iter().filter(|b| b.has_missing_values()).count();
    if missing > 0 {
      return ValidationOutcome::failed(
        format!("Critical data quality issues: {missing} bars with missing values"),
        vec![format!("missing_values: {missing}")],
        bars.len(),
      );
    }

    let mut soft_issues = Vec::new();

    if bars.len() > 1 {
      let extreme_moves = bars
        .windows(2)
        .filter(|pair| {
          pair[0].close > 0.0 && ((pair[1].close - pair[0].close) / pair[0].close).abs() > 0.5
        })
        .count();
      if extreme_moves > 0 {
        soft_issues.push(format!("{extreme_moves} bars with extreme price movements (>50%)"));
      }

      let duplicate_bars = bars
        .windows(2)
        .filter(|pair| {
          pair[1].open == pair[0].open
            && pair[1].high == pair[0].high
            && pair[1].low == pair[0].low
            && pair[1].close == pair[0].close
        })
        .count();
      if duplicate_bars > 0 {
        soft_issues.push(format!("{duplicate_bars} bars with identical price data to previous bar"));
      }
    }

    let zero_volume = bars.iter().filter(|b| b.volume == 0).count();
    if zero_volume > 0 {
      warn!("Found {} bars with zero volume", zero_volume);
    }

    if bars.len() > 10 {
      let mut volumes: Vec<i64> = bars.iter().map(|b| b.volume).collect();
      volumes.sort_unstable();
      let median = volumes[volumes.len() / 2];
      if median > 0 {
        let high_volume = bars.iter().filter(|b| b.volume > median * 100).count();
        if high_volume > 0 {
          soft_issues.push(format!("{high_volume} bars with extremely high volume (>100x median)"));
        }
      }
    }

    if !soft_issues.is_empty() {
      warn!("Data quality issues found: {}", soft_issues.join("; "));
    }

    ValidationOutcome::passed("Data quality validation passed", bars.len(), None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{TimeZone, Utc};
  use ibd_core::config::ExpectedBars;
  use ibd_core::market::calendar::WeekdayCalendar;
  use std::sync::Arc;

  fn validator() -> BarValidator {
    BarValidator::new(MarketCalendar::new(Arc::new(WeekdayCalendar), ExpectedBars::default()))
  }

  // Tuesday
  fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
  }

  fn session(n: usize) -> Vec<Bar> {
    let open_time = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
    (0..n)
      .map(|i| {
        let base = 100.0 + (i as f64) * 0.01;
        Bar {
          timestamp: open_time + chrono::Duration::minutes(i as i64),
          open: base,
          high: base + 0.5,
          low: base - 0.5,
          close: base + 0.1,
          volume: 1000 + i as i64,
          bar_count: 40,
        }
      })
      .collect()
  }

  #[test]
  fn test_empty_day_is_valid() {
    let outcome = validator().validate_day(&[], "AAPL", date());
    assert!(outcome.is_valid);
    assert_eq!(outcome.validated_bars, 0);
  }

  #[test]
  fn test_full_regular_day_passes() {
    let outcome = validator().validate_day(&session(390), "AAPL", date());
    assert!(outcome.is_valid, "{}", outcome.message);
    assert_eq!(outcome.validated_bars, 390);
    assert_eq!(outcome.expected_bars, Some(390));
  }

  #[test]
  fn test_early_close_counts_accepted_on_regular_day() {
    for count in [210usize, 360] {
      let outcome = validator().validate_day(&session(count), "AAPL", date());
      assert!(outcome.is_valid, "{count}: {}", outcome.message);
      assert_eq!(outcome.expected_bars, Some(count as u32));
    }
  }

  #[test]
  fn test_unexpected_bar_count_fails() {
    let outcome = validator().validate_day(&session(17), "AAPL", date());
    assert!(!outcome.is_valid);
    assert!(outcome.message.contains("Bar count mismatch"));
    assert_eq!(outcome.expected_bars, Some(390));
  }

  #[test]
  fn test_price_inconsistency_fails() {
    let mut bars = session(390);
    bars[10].high = bars[10].low - 1.0;
    let outcome = validator().validate_day(&bars, "AAPL", date());
    assert!(!outcome.is_valid);
    assert!(outcome.message.contains("High < Low"));
  }

  #[test]
  fn test_negative_volume_fails() {
    let mut bars = session(390);
    bars[0].volume = -5;
    let outcome = validator().validate_day(&bars, "AAPL", date());
    assert!(!outcome.is_valid);
    assert!(outcome.message.contains("Negative volume"));
  }

  #[test]
  fn test_duplicate_timestamps_fail() {
    let mut bars = session(390);
    bars[5].timestamp = bars[4].timestamp;
    let outcome = validator().validate_day(&bars, "AAPL", date());
    assert!(!outcome.is_valid);
    assert!(outcome.message.contains("duplicate timestamps"));
  }

  #[test]
  fn test_out_of_order_timestamps_fail() {
    let mut bars = session(390);
    bars.swap(5, 6);
    let outcome = validator().validate_day(&bars, "AAPL", date());
    assert!(!outcome.is_valid);
    assert!(outcome.message.contains("ascending order"));
  }

  #[test]
  fn test_gap_in_intervals_is_only_a_warning() {
    let mut bars = session(390);
    // Introduce a two-minute gap without reordering by shifting the tail.
    for bar in bars.iter_mut().skip(200) {
      bar.timestamp += chrono::Duration::minutes(1);
    }
    // Count stays 390; the sequence has one irregular interval.
    let outcome = validator().validate_day(&bars, "AAPL", date());
    assert!(outcome.is_valid, "{}", outcome.message);
  }

  #[test]
  fn test_nan_close_fails_quality() {
    let mut bars = session(390);
    bars[100].close = f64::NAN;
    let outcome = validator().validate_day(&bars, "AAPL", date());
    assert!(!outcome.is_valid);
    assert!(outcome.message.contains("missing values"));
  }

  #[test]
  fn test_holiday_calendar_with_bars_fails_count_check() {
    // Saturday: the calendar expects zero bars.
    let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
    let outcome = validator().validate_day(&session(17), "AAPL", saturday);
    assert!(!outcome.is_valid);
  }
}
