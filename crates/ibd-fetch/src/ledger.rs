//! The per-symbol status ledger.
//!
//! `data/<SYMBOL>/bar_status.csv` is the sole source of resumability
//! truth: one row per trading date recording how the archive attempt
//! ended. Writes rewrite the whole table through a temp-file rename, so a
//! crash can never leave a torn file behind. Loading tolerates malformed
//! rows by logging and skipping them.

use crate::error::{FetchError, FetchResult};
use chrono::{DateTime, NaiveDate, Utc};
use ibd_core::BarStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// One ledger row: the outcome for a (symbol, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
  pub date: NaiveDate,
  pub status: BarStatus,
  pub expected_bars: u32,
  pub actual_bars: u32,
  pub last_timestamp: Option<DateTime<Utc>>,
  pub error_message: Option<String>,
  pub retry_count: u32,
}

impl StatusRecord {
  pub fn new(date: NaiveDate, status: BarStatus, expected_bars: u32, actual_bars: u32) -> Self {
    Self {
      date,
      status,
      expected_bars,
      actual_bars,
      last_timestamp: None,
      error_message: None,
      retry_count: 0,
    }
  }

  pub fn with_last_timestamp(mut self, last_timestamp: Option<DateTime<Utc>>) -> Self {
    self.last_timestamp = last_timestamp;
    self
  }

  pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
    self.error_message = Some(message.into());
    self
  }

  pub fn with_retry_count(mut self, retry_count: u32) -> Self {
    self.retry_count = retry_count;
    self
  }
}

/// Summary statistics for one symbol's ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
  pub symbol: String,
  pub total_dates: usize,
  pub completed: usize,
  pub errors: usize,
  pub success_rate: f64,
  /// Oldest successfully archived date. The walk runs newest to oldest,
  /// so this is the frontier of archived history.
  pub oldest_success: Option<NaiveDate>,
}

/// Reads and rewrites per-symbol status tables.
#[derive(Debug, Clone)]
pub struct Ledger {
  data_dir: PathBuf,
}

impl Ledger {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self { data_dir: data_dir.into() }
  }

  pub fn status_path(&self, symbol: &str) -> PathBuf {
    self.data_dir.join(symbol).join("bar_status.csv")
  }

  /// Load all records for a symbol, ascending by date. Missing file means
  /// an empty ledger; malformed rows are logged and skipped.
  pub fn load(&self, symbol: &str) -> Vec<StatusRecord> {
    let path = self.status_path(symbol);
    if !path.exists() {
      debug!("No status ledger found for {}", symbol);
      return Vec::new();
    }

    let mut reader = match csv::Reader::from_path(&path) {
      Ok(reader) => reader,
      Err(e) => {
        error!("Failed to open status ledger for {}: {}", symbol, e);
        return Vec::new();
      }
    };

    let mut records: Vec<StatusRecord> = Vec::new();
    for result in reader.deserialize() {
      match result {
        Ok(record) => records.push(record),
        Err(e) => {
          warn!("Invalid status record for {}: {}", symbol, e);
        }
      }
    }

    records.sort_by_key(|r| r.date);
    debug!("Loaded {} status records for {}", records.len(), symbol);
    records
  }

  /// Insert or replace the record for the given date.
  ///
  /// The table is rewritten sorted ascending by date via an atomic rename.
  /// A terminal row (COMPLETE / EARLY_CLOSE / HOLIDAY) is never replaced
  /// by an ERROR row; the settled outcome stands.
  pub fn upsert(&self, symbol: &str, record: StatusRecord) -> FetchResult<()> {
    let path = self.status_path(symbol);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let mut records = self.load(symbol);

    match records.iter().position(|r| r.date == record.date) {
      Some(index) => {
        if records[index].status.is_terminal() && record.status == BarStatus::Error {
          debug!(
            "Keeping terminal {} for {} on {}; not downgrading to ERROR",
            records[index].status, symbol, record.date
          );
          return Ok(());
        }
        records[index] = record;
      }
      None => records.push(record),
    }

    records.sort_by_key(|r| r.date);
    self.write_all(&path, &records)
  }

  fn write_all(&self, path: &Path, records: &[StatusRecord]) -> FetchResult<()> {
    let tmp_path = path.with_extension("csv.tmp");
    {
      let mut writer = csv::Writer::from_path(&tmp_path)
        .map_err(|e| FetchError::LedgerError(format!("{}: {}", tmp_path.display(), e)))?;
      for record in records {
        writer.serialize(record)?;
      }
      writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
  }

  /// Dates whose outcome counts as archived (COMPLETE or EARLY_CLOSE).
  /// HOLIDAY rows are terminal but re-yield cheaply through the planner,
  /// so they are not part of this set.
  pub fn completed_dates(&self, symbol: &str) -> HashSet<NaiveDate> {
    self
      .load(symbol)
      .into_iter()
      .filter(|r| r.status.is_success())
      .map(|r| r.date)
      .collect()
  }

  /// Dates recorded as ERROR.
  pub fn error_dates(&self, symbol: &str) -> HashSet<NaiveDate> {
    self
      .load(symbol)
      .into_iter()
      .filter(|r| r.status == BarStatus::Error)
      .map(|r| r.date)
      .collect()
  }

  /// Length of the contiguous ERROR prefix scanning from the latest date
  /// downwards. Retained for diagnostics; the scheduler's skip gate is the
  /// retry policy's no-data streak, not this counter.
  pub fn consecutive_failures(&self, symbol: &str) -> usize {
    let records = self.load(symbol);
    records.iter().rev().take_while(|r| r.status == BarStatus::Error).count()
  }

  /// Summary statistics for the symbol.
  pub fn summary(&self, symbol: &str) -> LedgerSummary {
    let records = self.load(symbol);
    let completed = records.iter().filter(|r| r.status.is_success()).count();
    let errors = records.iter().filter(|r| r.status == BarStatus::Error).count();
    let attempted = completed + errors;
    let success_rate =
      if attempted > 0 { completed as f64 / attempted as f64 * 100.0 } else { 0.0 };
    let oldest_success = records.iter().filter(|r| r.status.is_success()).map(|r| r.date).min();

    LedgerSummary {
      symbol: symbol.to_string(),
      total_dates: records.len(),
      completed,
      errors,
      success_rate,
      oldest_success,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
  }

  fn ledger() -> (tempfile::TempDir, Ledger) {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path());
    (dir, ledger)
  }

  #[test]
  fn test_load_missing_ledger_is_empty() {
    let (_dir, ledger) = ledger();
    assert!(ledger.load("AAPL").is_empty());
  }

  #[test]
  fn test_upsert_then_load_round_trips() {
    let (_dir, ledger) = ledger();
    let record = StatusRecord::new(date(2), BarStatus::Complete, 390, 390)
      .with_last_timestamp(Some(Utc.with_ymd_and_hms(2024, 1, 2, 20, 59, 0).unwrap()));
    ledger.upsert("AAPL", record.clone()).unwrap();

    let loaded = ledger.load("AAPL");
    assert_eq!(loaded, vec![record]);
  }

  #[test]
  fn test_upsert_replaces_row_for_same_date() {
    let (_dir, ledger) = ledger();
    ledger
      .upsert(
        "AAPL",
        StatusRecord::new(date(2), BarStatus::Error, 390, 0)
          .with_error_message("Fetch failed")
          .with_retry_count(1),
      )
      .unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Complete, 390, 390)).unwrap();

    let loaded = ledger.load("AAPL");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].status, BarStatus::Complete);
  }

  #[test]
  fn test_upsert_keeps_rows_sorted_by_date() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(5), BarStatus::Complete, 390, 390)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Complete, 390, 390)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(3), BarStatus::Holiday, 0, 0)).unwrap();

    let dates: Vec<NaiveDate> = ledger.load("AAPL").iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date(2), date(3), date(5)]);
  }

  #[test]
  fn test_terminal_row_is_not_downgraded_to_error() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Complete, 390, 390)).unwrap();
    ledger
      .upsert(
        "AAPL",
        StatusRecord::new(date(2), BarStatus::Error, 390, 0).with_error_message("late failure"),
      )
      .unwrap();

    assert_eq!(ledger.load("AAPL")[0].status, BarStatus::Complete);
  }

  #[test]
  fn test_error_row_can_become_complete() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Error, 390, 0)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::EarlyClose, 210, 210)).unwrap();

    assert_eq!(ledger.load("AAPL")[0].status, BarStatus::EarlyClose);
  }

  #[test]
  fn test_completed_dates_excludes_holiday_and_error() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Complete, 390, 390)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(3), BarStatus::EarlyClose, 210, 210)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(4), BarStatus::Holiday, 0, 0)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(5), BarStatus::Error, 390, 0)).unwrap();

    let completed = ledger.completed_dates("AAPL");
    assert_eq!(completed, HashSet::from([date(2), date(3)]));
    assert_eq!(ledger.error_dates("AAPL"), HashSet::from([date(5)]));
  }

  #[test]
  fn test_consecutive_failures_counts_latest_error_prefix() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Error, 390, 0)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(3), BarStatus::Complete, 390, 390)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(4), BarStatus::Error, 390, 0)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(5), BarStatus::Error, 390, 0)).unwrap();

    assert_eq!(ledger.consecutive_failures("AAPL"), 2);
  }

  #[test]
  fn test_consecutive_failures_zero_when_latest_succeeded() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Error, 390, 0)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(3), BarStatus::Complete, 390, 390)).unwrap();

    assert_eq!(ledger.consecutive_failures("AAPL"), 0);
  }

  #[test]
  fn test_summary() {
    let (_dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Complete, 390, 390)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(3), BarStatus::Complete, 390, 390)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(4), BarStatus::Holiday, 0, 0)).unwrap();
    ledger.upsert("AAPL", StatusRecord::new(date(5), BarStatus::Error, 390, 0)).unwrap();

    let summary = ledger.summary("AAPL");
    assert_eq!(summary.total_dates, 4);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.errors, 1);
    assert!((summary.success_rate - 66.666).abs() < 0.01);
    assert_eq!(summary.oldest_success, Some(date(2)));
  }

  #[test]
  fn test_summary_of_empty_ledger() {
    let (_dir, ledger) = ledger();
    let summary = ledger.summary("AAPL");
    assert_eq!(summary.total_dates, 0);
    assert_eq!(summary.success_rate, 0.0);
    assert_eq!(summary.oldest_success, None);
  }

  #[test]
  fn test_malformed_rows_are_skipped_on_load() {
    let (dir, ledger) = ledger();
    let symbol_dir = dir.path().join("AAPL");
    std::fs::create_dir_all(&symbol_dir).unwrap();
    std::fs::write(
      symbol_dir.join("bar_status.csv"),
      "date,status,expected_bars,actual_bars,last_timestamp,error_message,retry_count\n\
       2024-01-02,COMPLETE,390,390,,,0\n\
       not-a-date,COMPLETE,390,390,,,0\n\
       2024-01-03,BOGUS,390,390,,,0\n\
       2024-01-04,ERROR,390,0,,timeout,2\n",
    )
    .unwrap();

    let records = ledger.load("AAPL");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].date, date(2));
    assert_eq!(records[1].retry_count, 2);
  }

  #[test]
  fn test_ledger_csv_header() {
    let (dir, ledger) = ledger();
    ledger.upsert("AAPL", StatusRecord::new(date(2), BarStatus::Complete, 390, 390)).unwrap();

    let content = std::fs::read_to_string(dir.path().join("AAPL").join("bar_status.csv")).unwrap();
    let header = content.lines().next().unwrap();
    assert_eq!(
      header,
      "date,status,expected_bars,actual_bars,last_timestamp,error_message,retry_count"
    );
  }
}
