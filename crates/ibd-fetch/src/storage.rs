//! Daily bar files.
//!
//! Validated days are written to `data/<SYMBOL>/raw/YYYY-MM-DD.csv` and
//! never touched again; the ledger is what records the outcome.

use crate::error::FetchResult;
use chrono::NaiveDate;
use ibd_core::Bar;
use std::path::PathBuf;
use tracing::debug;

/// Writes daily bar files under the data directory.
#[derive(Debug, Clone)]
pub struct BarStore {
  data_dir: PathBuf,
}

impl BarStore {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self { data_dir: data_dir.into() }
  }

  pub fn symbol_dir(&self, symbol: &str) -> PathBuf {
    self.data_dir.join(symbol)
  }

  pub fn daily_path(&self, symbol: &str, date: NaiveDate) -> PathBuf {
    self.symbol_dir(symbol).join("raw").join(format!("{}.csv", date.format("%Y-%m-%d")))
  }

  /// Create `data/<SYMBOL>/` and `data/<SYMBOL>/raw/`.
  pub fn ensure_symbol_dirs(&self, symbol: &str) -> FetchResult<()> {
    std::fs::create_dir_all(self.symbol_dir(symbol).join("raw"))?;
    debug!("Ensured directories exist for symbol {}", symbol);
    Ok(())
  }

  /// Write one day of bars, atomically.
  pub fn save_daily_bars(&self, symbol: &str, date: NaiveDate, bars: &[Bar]) -> FetchResult<()> {
    self.ensure_symbol_dirs(symbol)?;
    let path = self.daily_path(symbol, date);
    let tmp_path = path.with_extension("csv.tmp");

    {
      let mut writer = csv::Writer::from_path(&tmp_path)?;
      for bar in bars {
        writer.serialize(bar)?;
      }
      writer.flush()?;
    }
    std::fs::rename(&tmp_path, &path)?;

    debug!("Saved {} bars for {} {} to {}", bars.len(), symbol, date, path.display());
    Ok(())
  }
}
