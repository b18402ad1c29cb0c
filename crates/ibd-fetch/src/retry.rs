//! Smart retry policy.
//!
//! Distinguishes "history does not exist" from transient trouble. A date
//! is retried up to a cap; only dates abandoned because every attempt came
//! back empty-handed extend the symbol's no-data streak, and a long enough
//! streak latches the symbol as skipped. A vendor outage (all NETWORK)
//! therefore never skips a symbol, while a walk into pre-listing history
//! (all NO_DATA) terminates in bounded time.

use chrono::{DateTime, NaiveDate, Utc};
use ibd_core::config::FailureHandlingSettings;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Classification of a failed archive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureType {
  /// The gateway answered that no history exists for the date.
  NoData,
  /// Connection or timeout trouble.
  Network,
  /// Gateway API complaints (pacing, permissions, bad contract).
  Api,
  /// The day arrived but did not survive validation.
  Validation,
  Unknown,
}

impl std::fmt::Display for FailureType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      FailureType::NoData => "no_data",
      FailureType::Network => "network_error",
      FailureType::Api => "api_error",
      FailureType::Validation => "validation_error",
      FailureType::Unknown => "unknown",
    };
    write!(f, "{s}")
  }
}

const NO_DATA_PHRASES: [&str; 5] =
  ["no data", "empty", "zero bars", "no historical data", "data not available"];
const NETWORK_PHRASES: [&str; 5] =
  ["timeout", "connection", "network", "socket", "disconnected"];
const API_PHRASES: [&str; 7] = [
  "api error",
  "request limit",
  "rate limit",
  "invalid contract",
  "market data",
  "permission",
  "subscription",
];
const VALIDATION_PHRASES: [&str; 5] =
  ["validation", "invalid data", "corrupt", "malformed", "data quality"];

/// Attempt bookkeeping for one date.
#[derive(Debug, Clone)]
pub struct DateAttempt {
  pub retry_count: u32,
  pub failure_type: FailureType,
  pub last_attempt: DateTime<Utc>,
  pub error_message: String,
}

impl DateAttempt {
  fn can_retry(&self, max_retries: u32) -> bool {
    self.retry_count < max_retries
  }
}

#[derive(Debug, Default)]
struct SymbolRetryState {
  consecutive_no_data_days: u32,
  date_attempts: HashMap<NaiveDate, DateAttempt>,
  should_skip: bool,
  last_update: Option<DateTime<Utc>>,
}

/// Retry summary for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySummary {
  pub symbol: String,
  pub consecutive_no_data_days: u32,
  pub should_skip: bool,
  pub total_failed_dates: usize,
  pub retryable_dates: usize,
  pub exhausted_dates: usize,
}

/// Retry statistics across all tracked symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct OverallRetrySummary {
  pub symbols_tracked: usize,
  pub symbols_skipped: usize,
  pub total_failed_dates: usize,
  pub no_data_failures: usize,
}

/// Per-run retry state. Owned by the scheduler, discarded at process exit.
#[derive(Debug)]
pub struct RetryPolicy {
  max_consecutive_no_data_days: u32,
  max_retries_per_date: u32,
  states: HashMap<String, SymbolRetryState>,
}

impl RetryPolicy {
  pub fn new(settings: &FailureHandlingSettings) -> Self {
    info!(
      "Retry policy initialized: max_no_data_days={}, max_retries_per_date={}",
      settings.max_consecutive_no_data_days, settings.max_retries_per_date
    );
    Self {
      max_consecutive_no_data_days: settings.max_consecutive_no_data_days,
      max_retries_per_date: settings.max_retries_per_date,
      states: HashMap::new(),
    }
  }

  pub fn max_retries_per_date(&self) -> u32 {
    self.max_retries_per_date
  }

  pub fn max_consecutive_no_data_days(&self) -> u32 {
    self.max_consecutive_no_data_days
  }

  /// Classify a failure from its message and whether any data arrived.
  /// An empty-handed response is NO_DATA whatever the message says.
  pub fn classify(error_message: &str, data_received: bool) -> FailureType {
    let lower = error_message.to_lowercase();

    if !data_received || NO_DATA_PHRASES.iter().any(|p| lower.contains(p)) {
      return FailureType::NoData;
    }
    if NETWORK_PHRASES.iter().any(|p| lower.contains(p)) {
      return FailureType::Network;
    }
    if API_PHRASES.iter().any(|p| lower.contains(p)) {
      return FailureType::Api;
    }
    if VALIDATION_PHRASES.iter().any(|p| lower.contains(p)) {
      return FailureType::Validation;
    }
    FailureType::Unknown
  }

  /// Record a failed attempt; returns its classification.
  pub fn record_failure(
    &mut self,
    symbol: &str,
    date: NaiveDate,
    error_message: &str,
    data_received: bool,
  ) -> FailureType {
    let failure_type = Self::classify(error_message, data_received);
    let max_retries = self.max_retries_per_date;
    let max_streak = self.max_consecutive_no_data_days;

    let state = self.states.entry(symbol.to_string()).or_default();
    state.last_update = Some(Utc::now());

    let attempt = state.date_attempts.entry(date).or_insert(DateAttempt {
      retry_count: 0,
      failure_type,
      last_attempt: Utc::now(),
      error_message: String::new(),
    });
    attempt.retry_count += 1;
    attempt.failure_type = failure_type;
    attempt.last_attempt = Utc::now();
    attempt.error_message = error_message.to_string();
    let retry_count = attempt.retry_count;

    if failure_type == FailureType::NoData {
      if retry_count >= max_retries {
        // The date is exhausted with nothing to show for it.
        state.consecutive_no_data_days += 1;
        warn!(
          "{}: date {} exhausted after {} retries (no data) - consecutive no-data days: {}",
          symbol, date, retry_count, state.consecutive_no_data_days
        );

        if state.consecutive_no_data_days >= max_streak {
          state.should_skip = true;
          error!(
            "{}: marking for skip after {} consecutive no-data days (limit: {})",
            symbol, state.consecutive_no_data_days, max_streak
          );
        }
      }
    } else {
      warn!(
        "{}: date {} failed with {} (attempt {}/{}) - not counting toward consecutive no-data",
        symbol, date, failure_type, retry_count, max_retries
      );
    }

    failure_type
  }

  /// Record a success: the date's attempt entry is dropped and the
  /// symbol's no-data streak resets.
  pub fn record_success(&mut self, symbol: &str, date: NaiveDate) {
    let state = self.states.entry(symbol.to_string()).or_default();
    state.last_update = Some(Utc::now());

    if state.consecutive_no_data_days > 0 {
      info!(
        "{}: success on {} resets consecutive no-data streak (was {} days)",
        symbol, date, state.consecutive_no_data_days
      );
      state.consecutive_no_data_days = 0;
    }

    state.date_attempts.remove(&date);
  }

  /// True once the symbol's no-data streak latched the skip flag.
  pub fn should_skip_symbol(&self, symbol: &str) -> bool {
    self.states.get(symbol).map(|s| s.should_skip).unwrap_or(false)
  }

  /// True while the date has attempt budget left.
  pub fn can_retry_date(&self, symbol: &str, date: NaiveDate) -> bool {
    match self.states.get(symbol).and_then(|s| s.date_attempts.get(&date)) {
      Some(attempt) => attempt.can_retry(self.max_retries_per_date),
      None => true,
    }
  }

  pub fn retry_info(&self, symbol: &str, date: NaiveDate) -> Option<&DateAttempt> {
    self.states.get(symbol).and_then(|s| s.date_attempts.get(&date))
  }

  pub fn symbol_summary(&self, symbol: &str) -> RetrySummary {
    match self.states.get(symbol) {
      None => RetrySummary {
        symbol: symbol.to_string(),
        consecutive_no_data_days: 0,
        should_skip: false,
        total_failed_dates: 0,
        retryable_dates: 0,
        exhausted_dates: 0,
      },
      Some(state) => {
        let retryable = state
          .date_attempts
          .values()
          .filter(|a| a.can_retry(self.max_retries_per_date))
          .count();
        RetrySummary {
          symbol: symbol.to_string(),
          consecutive_no_data_days: state.consecutive_no_data_days,
          should_skip: state.should_skip,
          total_failed_dates: state.date_attempts.len(),
          retryable_dates: retryable,
          exhausted_dates: state.date_attempts.len() - retryable,
        }
      }
    }
  }

  pub fn overall_summary(&self) -> OverallRetrySummary {
    let no_data_failures = self
      .states
      .values()
      .flat_map(|s| s.date_attempts.values())
      .filter(|a| a.failure_type == FailureType::NoData)
      .count();
    OverallRetrySummary {
      symbols_tracked: self.states.len(),
      symbols_skipped: self.states.values().filter(|s| s.should_skip).count(),
      total_failed_dates: self.states.values().map(|s| s.date_attempts.len()).sum(),
      no_data_failures,
    }
  }
}
