//! The sequential archive scheduler.
//!
//! One logical worker drains the symbol queue in order. Per symbol it asks
//! the planner for remaining dates (newest first) and walks them; per date
//! it retries up to the policy's budget, persisting every outcome to the
//! ledger before moving on. The shutdown flag is observed at every loop
//! boundary; a forced cancellation abandons the in-flight date without
//! writing anything.

use crate::fetcher::{DayFetcher, DayOutcome, FetchDay};
use crate::ledger::{Ledger, StatusRecord};
use crate::planner::DatePlanner;
use crate::progress::{ProgressTracker, format_duration};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownController;
use crate::storage::BarStore;
use chrono::{DateTime, NaiveDate, Utc};
use ibd_core::{BarStatus, MarketCalendar};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of one symbol's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
  Pending,
  Running,
  Complete,
  Error,
  Paused,
}

impl std::fmt::Display for JobStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      JobStatus::Pending => "PENDING",
      JobStatus::Running => "RUNNING",
      JobStatus::Complete => "COMPLETE",
      JobStatus::Error => "ERROR",
      JobStatus::Paused => "PAUSED",
    };
    write!(f, "{s}")
  }
}

/// Progress of the active symbol's job. Published as a read-only snapshot
/// for the reporter.
#[derive(Debug, Clone)]
pub struct JobProgress {
  pub symbol: String,
  pub total_dates: usize,
  pub completed_dates: usize,
  pub error_dates: usize,
  pub current_date: Option<NaiveDate>,
  pub started: DateTime<Utc>,
  pub last_update: DateTime<Utc>,
  pub status: JobStatus,
  pub symbol_eta: Option<Duration>,
}

impl JobProgress {
  pub fn new(symbol: &str, total_dates: usize) -> Self {
    let now = Utc::now();
    Self {
      symbol: symbol.to_string(),
      total_dates,
      completed_dates: 0,
      error_dates: 0,
      current_date: None,
      started: now,
      last_update: now,
      status: JobStatus::Pending,
      symbol_eta: None,
    }
  }

  pub fn completion_percentage(&self) -> f64 {
    if self.total_dates == 0 {
      return 0.0;
    }
    self.completed_dates as f64 / self.total_dates as f64 * 100.0
  }

  pub fn success_rate(&self) -> f64 {
    let attempted = self.completed_dates + self.error_dates;
    if attempted == 0 {
      return 0.0;
    }
    self.completed_dates as f64 / attempted as f64 * 100.0
  }

  pub fn remaining_dates(&self) -> usize {
    self.total_dates.saturating_sub(self.completed_dates + self.error_dates)
  }
}

/// Snapshot cell shared between the scheduler and the reporter.
pub type SharedProgress = Arc<Mutex<Option<JobProgress>>>;

/// What a finished (or interrupted) run looked like.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
  pub symbols_total: usize,
  pub symbols_processed: usize,
  pub symbols_with_work: usize,
  pub symbols_skipped: usize,
  pub stopped_early: bool,
}

enum AttemptResult {
  Outcome(DayOutcome),
  Cancelled,
  Forced,
}

/// Sequential symbol/date scheduler.
pub struct Scheduler {
  fetcher: Arc<DayFetcher>,
  planner: DatePlanner,
  calendar: MarketCalendar,
  ledger: Ledger,
  store: BarStore,
  retry: RetryPolicy,
  tracker: ProgressTracker,
  shutdown: Arc<ShutdownController>,
  progress: SharedProgress,
  per_date_timeout: Duration,
}

impl Scheduler {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    fetcher: Arc<DayFetcher>,
    planner: DatePlanner,
    calendar: MarketCalendar,
    ledger: Ledger,
    store: BarStore,
    retry: RetryPolicy,
    tracker: ProgressTracker,
    shutdown: Arc<ShutdownController>,
    per_date_timeout: Duration,
  ) -> Self {
    Self {
      fetcher,
      planner,
      calendar,
      ledger,
      store,
      retry,
      tracker,
      shutdown,
      progress: Arc::new(Mutex::new(None)),
      per_date_timeout,
    }
  }

  /// Snapshot cell for the reporter.
  pub fn progress_handle(&self) -> SharedProgress {
    self.progress.clone()
  }

  pub fn retry_policy(&self) -> &RetryPolicy {
    &self.retry
  }

  pub fn tracker(&self) -> &ProgressTracker {
    &self.tracker
  }

  /// Drain the symbol queue. Per-date failures never escape this loop;
  /// they end up in the ledger and the report.
  pub async fn run(&mut self, symbols: &[String]) -> RunReport {
    self.tracker.start_overall();
    let mut report = RunReport { symbols_total: symbols.len(), ..Default::default() };

    info!("Starting jobs for {} symbols", symbols.len());

    for (index, symbol) in symbols.iter().enumerate() {
      if self.shutdown.is_stop_requested() {
        info!("Shutdown requested, stopping processing of remaining symbols");
        report.stopped_early = true;
        break;
      }

      if self.retry.should_skip_symbol(symbol) {
        warn!(
          "Skipping symbol {} ({}/{}) due to retry policy decision",
          symbol,
          index + 1,
          symbols.len()
        );
        report.symbols_skipped += 1;
        report.symbols_processed += 1;
        continue;
      }

      let overall = self.tracker.overall_eta(symbols.len());
      info!(
        "Processing symbol {}/{}: {} | Overall progress: {:.1}% | ETA: {}",
        index + 1,
        symbols.len(),
        symbol,
        overall.completion_percentage,
        format_duration(overall.estimated_remaining)
      );

      let had_work = self.process_symbol(symbol).await;
      if had_work {
        report.symbols_with_work += 1;
        self.tracker.complete_symbol(symbol);
      }
      report.symbols_processed += 1;

      if self.shutdown.is_stop_requested() {
        info!("Shutdown requested after completing symbol {}", symbol);
        report.stopped_early = true;
        break;
      }
    }

    if report.stopped_early {
      self.shutdown.mark_stopping();
      warn!(
        "Jobs stopped due to shutdown request: {}",
        self.shutdown.reason().unwrap_or_else(|| "unknown".to_string())
      );
      info!(
        "Completed {}/{} symbols before shutdown ({} had work to do)",
        report.symbols_processed, report.symbols_total, report.symbols_with_work
      );
    } else {
      info!(
        "All jobs completed - processed {} symbols ({} had work to do)",
        report.symbols_processed, report.symbols_with_work
      );
    }

    report
  }

  /// Process one symbol. Returns whether there was work to do.
  async fn process_symbol(&mut self, symbol: &str) -> bool {
    info!("Starting processing for symbol: {}", symbol);

    if let Err(e) = self.store.ensure_symbol_dirs(symbol) {
      error!("Cannot prepare directories for {}: {}", symbol, e);
      return false;
    }

    let dates = self.planner.dates_to_process(symbol, &self.fetcher, &self.ledger).await;
    if dates.is_empty() {
      info!("No dates to process for symbol {}", symbol);
      return false;
    }

    self.tracker.start_symbol(symbol, dates.len());
    let mut job = JobProgress::new(symbol, dates.len());
    job.status = JobStatus::Running;
    self.publish(&job);

    info!("Processing {} dates for symbol {}", dates.len(), symbol);

    'dates: for date in dates {
      if self.shutdown.is_stop_requested() {
        info!("Shutdown requested during {} processing - stopping after current date", symbol);
        break;
      }
      if self.retry.should_skip_symbol(symbol) {
        warn!("Skipping remaining dates for {} due to retry policy decision", symbol);
        break;
      }
      if !self.retry.can_retry_date(symbol, date) {
        debug!("Skipping {} for {} - retry limit reached", date, symbol);
        job.error_dates += 1;
        self.tracker.update_symbol(symbol, job.completed_dates, job.error_dates);
        continue;
      }

      job.current_date = Some(date);
      self.publish(&job);

      // Attempt loop: the date is retried here until it succeeds or its
      // policy budget runs out.
      loop {
        let attempt =
          self.retry.retry_info(symbol, date).map(|a| a.retry_count).unwrap_or(0) + 1;
        debug!(
          "Processing {} for {} (attempt {}/{})",
          date,
          symbol,
          attempt,
          self.retry.max_retries_per_date()
        );

        let resolved = match self.attempt_date(symbol, date).await {
          AttemptResult::Forced => {
            warn!("Forced cancellation during {} for {} - outcome discarded", date, symbol);
            break 'dates;
          }
          AttemptResult::Cancelled => {
            info!("Operation cancelled for {} on {}", symbol, date);
            break 'dates;
          }
          AttemptResult::Outcome(outcome) => {
            self.settle_outcome(symbol, date, outcome, &mut job)
          }
        };

        self.tracker.update_symbol(symbol, job.completed_dates, job.error_dates);
        job.symbol_eta = self.tracker.symbol_eta(symbol).map(|(eta, _)| eta);
        job.last_update = Utc::now();
        self.publish(&job);

        if resolved {
          break;
        }
        if self.shutdown.is_stop_requested() {
          info!("Shutdown requested - completed {} for {} before stopping", date, symbol);
          break 'dates;
        }
        if self.retry.should_skip_symbol(symbol) {
          break;
        }
      }

      job.current_date = None;
    }

    self.finish_symbol(symbol, &mut job);
    true
  }

  /// One guarded fetch attempt: races the per-date wall-clock timeout and
  /// the forced-stop token against the fetch itself.
  async fn attempt_date(&self, symbol: &str, date: NaiveDate) -> AttemptResult {
    tokio::select! {
      _ = self.shutdown.force_cancelled() => AttemptResult::Forced,
      result = tokio::time::timeout(
        self.per_date_timeout,
        self.fetcher.fetch_and_validate_day(symbol, date),
      ) => match result {
        Ok(FetchDay::Done(outcome)) => AttemptResult::Outcome(outcome),
        Ok(FetchDay::Cancelled) => AttemptResult::Cancelled,
        Err(_) => {
          error!("Timeout processing {} for {} - attempt abandoned", date, symbol);
          AttemptResult::Outcome(DayOutcome {
            status: BarStatus::Error,
            bars: Vec::new(),
            message: format!("Timeout after {} seconds", self.per_date_timeout.as_secs()),
            data_received: true,
          })
        }
      },
    }
  }

  /// Persist an outcome and update the policy and counters. Returns true
  /// when the date is settled (success or attempt budget exhausted).
  fn settle_outcome(
    &mut self,
    symbol: &str,
    date: NaiveDate,
    outcome: DayOutcome,
    job: &mut JobProgress,
  ) -> bool {
    let expected_bars = self.calendar.expected_bar_count(date);

    if outcome.is_success() {
      if !outcome.bars.is_empty() {
        if let Err(e) = self.store.save_daily_bars(symbol, date, &outcome.bars) {
          // Failing to keep the bars makes the day a failure, whatever
          // the gateway said.
          let message = format!("Failed to save daily bars: {e}");
          error!("{} on {}: {}", symbol, date, message);
          return self.settle_failure(symbol, date, &message, true, expected_bars, job);
        }
      }

      let attempts = self.retry.retry_info(symbol, date).map(|a| a.retry_count).unwrap_or(0);
      let record = StatusRecord::new(date, outcome.status, expected_bars, outcome.bars.len() as u32)
        .with_last_timestamp(outcome.bars.last().map(|b| b.timestamp))
        .with_retry_count(attempts);
      if let Err(e) = self.ledger.upsert(symbol, record) {
        error!("Failed to update status ledger for {}: {}", symbol, e);
      }

      self.retry.record_success(symbol, date);
      job.completed_dates += 1;

      let eta = self
        .tracker
        .symbol_eta(symbol)
        .map(|(eta, _)| format_duration(eta))
        .unwrap_or_else(|| "-".to_string());
      info!(
        "✅ {} for {} ({}/{} - {:.1}%) | Symbol ETA: {}",
        date,
        symbol,
        job.completed_dates,
        job.total_dates,
        job.completion_percentage(),
        eta
      );
      true
    } else {
      self.settle_failure(symbol, date, &outcome.message, outcome.data_received, expected_bars, job)
    }
  }

  fn settle_failure(
    &mut self,
    symbol: &str,
    date: NaiveDate,
    message: &str,
    data_received: bool,
    expected_bars: u32,
    job: &mut JobProgress,
  ) -> bool {
    let failure_type = self.retry.record_failure(symbol, date, message, data_received);
    let attempts = self.retry.retry_info(symbol, date).map(|a| a.retry_count).unwrap_or(1);

    let record = StatusRecord::new(date, BarStatus::Error, expected_bars, 0)
      .with_error_message(message)
      .with_retry_count(attempts);
    if let Err(e) = self.ledger.upsert(symbol, record) {
      error!("Failed to update status ledger for {}: {}", symbol, e);
    }

    let summary = self.retry.symbol_summary(symbol);
    warn!(
      "❌ {} for {} (attempt {}/{}, {}) | No-data streak: {} days",
      date,
      symbol,
      attempts,
      self.retry.max_retries_per_date(),
      failure_type,
      summary.consecutive_no_data_days
    );

    let exhausted = !self.retry.can_retry_date(symbol, date);
    if exhausted {
      job.error_dates += 1;
    }
    exhausted
  }

  fn finish_symbol(&mut self, symbol: &str, job: &mut JobProgress) {
    let summary = self.retry.symbol_summary(symbol);

    if self.shutdown.is_stop_requested() {
      job.status = JobStatus::Paused;
      info!(
        "⏸️ Processing paused for {} due to shutdown: {} successful, {} errors ({:.1}% success rate) - {} dates remaining",
        symbol,
        job.completed_dates,
        job.error_dates,
        job.success_rate(),
        job.remaining_dates()
      );
    } else if summary.should_skip {
      job.status = JobStatus::Error;
      warn!(
        "🚫 Processing stopped for {} due to {} consecutive no-data days: {} successful, {} errors ({:.1}% success rate) - SYMBOL SKIPPED",
        symbol,
        summary.consecutive_no_data_days,
        job.completed_dates,
        job.error_dates,
        job.success_rate()
      );
    } else {
      job.status = JobStatus::Complete;
      info!(
        "✅ Completed processing for {}: {} successful, {} errors ({:.1}% success rate)",
        symbol,
        job.completed_dates,
        job.error_dates,
        job.success_rate()
      );
    }

    job.current_date = None;
    job.last_update = Utc::now();
    self.publish(job);

    // The job is over; the reporter goes quiet until the next symbol.
    *self.progress.lock().expect("progress lock poisoned") = None;
  }

  fn publish(&self, job: &JobProgress) {
    *self.progress.lock().expect("progress lock poisoned") = Some(job.clone());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_job_progress_percentages() {
    let mut job = JobProgress::new("AAPL", 4);
    assert_eq!(job.completion_percentage(), 0.0);
    assert_eq!(job.success_rate(), 0.0);

    job.completed_dates = 2;
    job.error_dates = 1;
    assert!((job.completion_percentage() - 50.0).abs() < f64::EPSILON);
    assert!((job.success_rate() - 66.666).abs() < 0.01);
    assert_eq!(job.remaining_dates(), 1);
  }

  #[test]
  fn test_job_progress_with_no_dates() {
    let job = JobProgress::new("AAPL", 0);
    assert_eq!(job.completion_percentage(), 0.0);
    assert_eq!(job.remaining_dates(), 0);
  }

  #[test]
  fn test_job_status_display() {
    assert_eq!(JobStatus::Paused.to_string(), "PAUSED");
    assert_eq!(JobStatus::Complete.to_string(), "COMPLETE");
  }
}
