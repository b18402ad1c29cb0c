//! ETA tracking.
//!
//! Per-date latency is floored at the pacing window (the fetcher cannot go
//! faster), so estimates converge quickly and never promise the
//! impossible. Nothing here is persisted; wall-clock progress is not a
//! correctness property.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Render a duration as `H:MM:SS` (no days component).
pub fn format_duration(duration: Duration) -> String {
  let total_seconds = duration.as_secs();
  let hours = total_seconds / 3600;
  let minutes = (total_seconds % 3600) / 60;
  let seconds = total_seconds % 60;
  format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Timing data for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolTiming {
  pub symbol: String,
  start: Instant,
  end: Option<Instant>,
  pub total_dates: usize,
  pub completed_dates: usize,
  pub error_dates: usize,
  pub avg_seconds_per_date: f64,
}

impl SymbolTiming {
  pub fn completion_rate(&self) -> f64 {
    if self.total_dates == 0 {
      return 100.0;
    }
    self.completed_dates as f64 / self.total_dates as f64 * 100.0
  }

  pub fn remaining_dates(&self) -> usize {
    self.total_dates.saturating_sub(self.completed_dates + self.error_dates)
  }

  fn estimated_remaining(&self, floor_seconds: f64) -> Duration {
    let remaining = self.remaining_dates();
    if remaining == 0 {
      return Duration::ZERO;
    }
    Duration::from_secs_f64(remaining as f64 * self.avg_seconds_per_date.max(floor_seconds))
  }

  fn duration(&self) -> Option<Duration> {
    self.end.map(|end| end - self.start)
  }
}

/// Overall ETA across the symbol queue.
#[derive(Debug, Clone, PartialEq)]
pub struct OverallEta {
  pub total_symbols: usize,
  pub completed_symbols: usize,
  pub remaining_symbols: usize,
  pub completion_percentage: f64,
  pub elapsed: Duration,
  pub estimated_remaining: Duration,
  pub current_symbol_eta: Duration,
}

/// Aggregate statistics over completed symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
  pub completed_symbols: usize,
  pub total_dates_processed: usize,
  pub successful_dates: usize,
  pub error_dates: usize,
  pub success_rate: f64,
  pub avg_symbol_duration: Duration,
  pub fastest_symbol: String,
  pub slowest_symbol: String,
}

/// Computes symbol and overall ETAs from observed per-date latency.
#[derive(Debug)]
pub struct ProgressTracker {
  floor_seconds: f64,
  timings: HashMap<String, SymbolTiming>,
  overall_start: Option<Instant>,
  completed_symbols: Vec<String>,
}

impl ProgressTracker {
  /// `rate_limit_window` floors every per-date estimate.
  pub fn new(rate_limit_window: Duration) -> Self {
    Self {
      floor_seconds: rate_limit_window.as_secs_f64(),
      timings: HashMap::new(),
      overall_start: None,
      completed_symbols: Vec::new(),
    }
  }

  pub fn start_overall(&mut self) {
    self.overall_start = Some(Instant::now());
  }

  pub fn start_symbol(&mut self, symbol: &str, total_dates: usize) {
    self.timings.insert(
      symbol.to_string(),
      SymbolTiming {
        symbol: symbol.to_string(),
        start: Instant::now(),
        end: None,
        total_dates,
        completed_dates: 0,
        error_dates: 0,
        avg_seconds_per_date: self.floor_seconds,
      },
    );
    debug!("Started timing for {} ({} dates)", symbol, total_dates);
  }

  /// Refresh the per-date average after an outcome.
  pub fn update_symbol(&mut self, symbol: &str, completed_dates: usize, error_dates: usize) {
    let Some(timing) = self.timings.get_mut(symbol) else {
      warn!("No timing data for symbol {}", symbol);
      return;
    };

    timing.completed_dates = completed_dates;
    timing.error_dates = error_dates;

    let processed = completed_dates + error_dates;
    if processed > 0 {
      let elapsed = timing.start.elapsed().as_secs_f64();
      timing.avg_seconds_per_date = elapsed / processed as f64;
    }
  }

  pub fn complete_symbol(&mut self, symbol: &str) {
    if let Some(timing) = self.timings.get_mut(symbol) {
      timing.end = Some(Instant::now());
    }
    if !self.completed_symbols.iter().any(|s| s == symbol) {
      self.completed_symbols.push(symbol.to_string());
    }
    debug!("Completed timing for {}", symbol);
  }

  /// `(estimated_remaining, completion_percentage)` for a symbol.
  pub fn symbol_eta(&self, symbol: &str) -> Option<(Duration, f64)> {
    let timing = self.timings.get(symbol)?;
    Some((timing.estimated_remaining(self.floor_seconds), timing.completion_rate()))
  }

  fn active_symbol(&self) -> Option<&SymbolTiming> {
    self.timings.values().find(|t| t.end.is_none())
  }

  /// Overall ETA given the size of the symbol queue.
  pub fn overall_eta(&self, total_symbols: usize) -> OverallEta {
    let elapsed = self.overall_start.map(|s| s.elapsed()).unwrap_or(Duration::ZERO);
    let completed_count = self.completed_symbols.len();

    let avg_seconds_per_symbol = if completed_count > 0 {
      let total: f64 = self
        .completed_symbols
        .iter()
        .filter_map(|s| self.timings.get(s))
        .filter_map(|t| t.duration())
        .map(|d| d.as_secs_f64())
        .sum();
      total / completed_count as f64
    } else if let Some(active) = self.active_symbol() {
      // Project the current symbol's total duration from its progress.
      if active.completed_dates > 0 && active.total_dates > 0 {
        let progress = active.completed_dates as f64 / active.total_dates as f64;
        active.start.elapsed().as_secs_f64() / progress
      } else {
        3600.0
      }
    } else {
      3600.0
    };

    let current_symbol_eta = self
      .active_symbol()
      .map(|t| t.estimated_remaining(self.floor_seconds))
      .unwrap_or(Duration::ZERO);

    let remaining_symbols = total_symbols.saturating_sub(completed_count);
    let queued_symbols = remaining_symbols.saturating_sub(1);
    let estimated_remaining = Duration::from_secs_f64(
      queued_symbols as f64 * avg_seconds_per_symbol + current_symbol_eta.as_secs_f64(),
    );

    OverallEta {
      total_symbols,
      completed_symbols: completed_count,
      remaining_symbols,
      completion_percentage: if total_symbols > 0 {
        completed_count as f64 / total_symbols as f64 * 100.0
      } else {
        100.0
      },
      elapsed,
      estimated_remaining,
      current_symbol_eta,
    }
  }

  /// Statistics over completed symbols, if any finished.
  pub fn performance_summary(&self) -> Option<PerformanceSummary> {
    let completed: Vec<&SymbolTiming> = self
      .completed_symbols
      .iter()
      .filter_map(|s| self.timings.get(s))
      .filter(|t| t.end.is_some())
      .collect();
    if completed.is_empty() {
      return None;
    }

    let successful_dates: usize = completed.iter().map(|t| t.completed_dates).sum();
    let error_dates: usize = completed.iter().map(|t| t.error_dates).sum();
    let attempted = successful_dates + error_dates;

    let durations: Vec<Duration> = completed.iter().filter_map(|t| t.duration()).collect();
    let total: f64 = durations.iter().map(|d| d.as_secs_f64()).sum();

    let fastest = completed
      .iter()
      .min_by(|a, b| a.duration().cmp(&b.duration()))
      .map(|t| t.symbol.clone())
      .unwrap_or_default();
    let slowest = completed
      .iter()
      .max_by(|a, b| a.duration().cmp(&b.duration()))
      .map(|t| t.symbol.clone())
      .unwrap_or_default();

    Some(PerformanceSummary {
      completed_symbols: completed.len(),
      total_dates_processed: completed.iter().map(|t| t.total_dates).sum(),
      successful_dates,
      error_dates,
      success_rate: if attempted > 0 {
        successful_dates as f64 / attempted as f64 * 100.0
      } else {
        0.0
      },
      avg_symbol_duration: Duration::from_secs_f64(total / durations.len().max(1) as f64),
      fastest_symbol: fastest,
      slowest_symbol: slowest,
    })
  }
}
