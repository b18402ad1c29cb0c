//! Remaining-work computation per symbol.
//!
//! The walk runs newest to oldest: recent history is what consumers want
//! first, and an interrupted run leaves the freshest days populated.
//! Archived dates (COMPLETE / EARLY_CLOSE) are dropped from the plan;
//! HOLIDAY rows re-yield because they short-circuit without a request, and
//! ERROR rows re-yield subject to the retry policy.

use crate::fetcher::DayFetcher;
use crate::ledger::Ledger;
use chrono::{Days, NaiveDate, Utc};
use ibd_core::MarketCalendar;
use tracing::{info, warn};

/// Produces the per-symbol work list.
#[derive(Debug, Clone)]
pub struct DatePlanner {
  calendar: MarketCalendar,
  /// Newest date to plan; defaults to yesterday (UTC).
  last_day: Option<NaiveDate>,
}

impl DatePlanner {
  pub fn new(calendar: MarketCalendar) -> Self {
    Self { calendar, last_day: None }
  }

  /// Pin the newest planned date instead of using yesterday.
  pub fn with_last_day(mut self, last_day: NaiveDate) -> Self {
    self.last_day = Some(last_day);
    self
  }

  fn last_day(&self) -> NaiveDate {
    self.last_day.unwrap_or_else(|| {
      Utc::now().date_naive().checked_sub_days(Days::new(1)).expect("valid date")
    })
  }

  /// Trading dates still to archive for a symbol, newest first. An
  /// unknown earliest date yields an empty plan.
  pub async fn dates_to_process(
    &self,
    symbol: &str,
    fetcher: &DayFetcher,
    ledger: &Ledger,
  ) -> Vec<NaiveDate> {
    let earliest = match fetcher.earliest_data_date(symbol).await {
      Ok(Some(earliest)) => earliest,
      Ok(None) => {
        warn!("Could not determine earliest data date for {}", symbol);
        return Vec::new();
      }
      Err(e) => {
        warn!("Head timestamp query failed for {}: {}", symbol, e);
        return Vec::new();
      }
    };

    let trading_dates = self.calendar.trading_dates(earliest, self.last_day());
    let completed = ledger.completed_dates(symbol);

    let mut dates: Vec<NaiveDate> =
      trading_dates.iter().copied().filter(|d| !completed.contains(d)).collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));

    info!(
      "Symbol {}: {} total trading dates, {} completed, {} remaining to process",
      symbol,
      trading_dates.len(),
      completed.len(),
      dates.len()
    );

    dates
  }
}
