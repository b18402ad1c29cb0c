//! Market calendar adapter.
//!
//! Wraps an exchange-calendar source behind [`TradingCalendar`] and turns
//! raw session times into a [`DaySchedule`] with the expected one-minute
//! bar count. When no calendar source is installed the adapter falls back
//! to plain business days with a regular session, which keeps the pipeline
//! fetching instead of refusing.

use crate::config::ExpectedBars;
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc, Weekday};
use std::sync::Arc;

/// Session classification for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayKind {
  Regular,
  /// Roughly six trading hours.
  EarlyCloseRegular,
  /// Three and a half trading hours or less.
  EarlyCloseShort,
  Holiday,
}

impl std::fmt::Display for DayKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      DayKind::Regular => "regular_day",
      DayKind::EarlyCloseRegular => "early_close_regular",
      DayKind::EarlyCloseShort => "early_close_short",
      DayKind::Holiday => "holiday",
    };
    write!(f, "{s}")
  }
}

/// Full schedule information for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySchedule {
  pub date: NaiveDate,
  pub kind: DayKind,
  pub expected_bars: u32,
  pub open: Option<DateTime<Utc>>,
  pub close: Option<DateTime<Utc>>,
  pub trading_minutes: Option<u32>,
}

impl DaySchedule {
  pub fn is_trading_day(&self) -> bool {
    self.kind != DayKind::Holiday
  }
}

/// Source of raw exchange sessions. Implementations return the UTC
/// open/close pair for a date, or `None` when the exchange is closed.
pub trait TradingCalendar: Send + Sync {
  fn session(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
}

/// Business-day source: Monday through Friday, regular 14:30-21:00 UTC
/// session, no holiday knowledge.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeekdayCalendar;

impl TradingCalendar for WeekdayCalendar {
  fn session(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    match date.weekday() {
      Weekday::Sat | Weekday::Sun => None,
      _ => {
        let open = Utc.from_utc_datetime(&date.and_hms_opt(14, 30, 0).expect("valid time"));
        let close = Utc.from_utc_datetime(
          &date.and_hms_opt(crate::DEFAULT_MARKET_CLOSE_UTC_HOUR, 0, 0).expect("valid time"),
        );
        Some((open, close))
      }
    }
  }
}

/// Calendar adapter used by the planner, fetcher, and validator.
#[derive(Clone)]
pub struct MarketCalendar {
  source: Option<Arc<dyn TradingCalendar>>,
  expected: ExpectedBars,
}

impl MarketCalendar {
  pub fn new(source: Arc<dyn TradingCalendar>, expected: ExpectedBars) -> Self {
    Self { source: Some(source), expected }
  }

  /// Adapter with no calendar source: every weekday is assumed to be a
  /// regular trading day.
  pub fn fallback(expected: ExpectedBars) -> Self {
    Self { source: None, expected }
  }

  pub fn expected_bars(&self) -> &ExpectedBars {
    &self.expected
  }

  /// Classify a date and compute its expected bar count.
  pub fn schedule(&self, date: NaiveDate) -> DaySchedule {
    let session = match &self.source {
      Some(source) => source.session(date),
      None => WeekdayCalendar.session(date),
    };

    match session {
      None => DaySchedule {
        date,
        kind: DayKind::Holiday,
        expected_bars: self.expected.holiday,
        open: None,
        close: None,
        trading_minutes: None,
      },
      Some((open, close)) => {
        let trading_minutes = (close - open).num_minutes().max(0) as u32;
        let (kind, expected_bars) = if trading_minutes <= 210 {
          (DayKind::EarlyCloseShort, 210)
        } else if trading_minutes <= 360 {
          (DayKind::EarlyCloseRegular, 360)
        } else {
          (DayKind::Regular, self.expected.regular_day)
        };
        DaySchedule {
          date,
          kind,
          expected_bars,
          open: Some(open),
          close: Some(close),
          trading_minutes: Some(trading_minutes),
        }
      }
    }
  }

  pub fn is_trading_day(&self, date: NaiveDate) -> bool {
    self.schedule(date).is_trading_day()
  }

  pub fn expected_bar_count(&self, date: NaiveDate) -> u32 {
    self.schedule(date).expected_bars
  }

  /// Exchange close for the date, or the fixed default close when the
  /// date has no session.
  pub fn close_utc(&self, date: NaiveDate) -> DateTime<Utc> {
    self.schedule(date).close.unwrap_or_else(|| {
      Utc.from_utc_datetime(
        &date.and_hms_opt(crate::DEFAULT_MARKET_CLOSE_UTC_HOUR, 0, 0).expect("valid time"),
      )
    })
  }

  /// True when the count matches the date's expectation or one of the
  /// always-acceptable early-close counts.
  pub fn validate_bar_count(&self, date: NaiveDate, actual_bars: u32) -> bool {
    if actual_bars == self.expected_bar_count(date) {
      return true;
    }
    self.expected.early_close.contains(&actual_bars)
  }

  /// Trading dates in `[from, to]`, ascending.
  pub fn trading_dates(&self, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = from;
    while current <= to {
      if self.is_trading_day(current) {
        dates.push(current);
      }
      match current.checked_add_days(Days::new(1)) {
        Some(next) => current = next,
        None => break,
      }
    }
    dates
  }
}

impl std::fmt::Debug for MarketCalendar {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MarketCalendar")
      .field("source", &self.source.is_some())
      .field("expected", &self.expected)
      .finish()
  }
}
