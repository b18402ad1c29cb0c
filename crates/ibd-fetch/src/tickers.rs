//! Ticker table reader.
//!
//! Loads `config/tickers.csv` into validated contracts and serves as the
//! universe of symbols when none are given on the command line. Rows that
//! fail contract validation are logged and skipped rather than failing the
//! whole table.

use crate::error::{FetchError, FetchResult};
use csv::Reader;
use ibd_client::ContractResolver;
use ibd_core::{Contract, SecType};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TickerRecord {
  symbol: String,

  #[serde(rename = "secType")]
  sec_type: String,

  exchange: String,

  currency: String,

  #[serde(rename = "lastTradeDateOrContractMonth", default)]
  last_trade_date_or_contract_month: Option<String>,

  #[serde(default)]
  strike: Option<f64>,

  #[serde(default)]
  right: Option<String>,

  #[serde(default)]
  multiplier: Option<String>,
}

/// The configured instrument universe.
pub struct TickerTable {
  symbols: Vec<String>,
  contracts: HashMap<String, Contract>,
}

impl TickerTable {
  /// Load and validate the ticker table.
  pub fn load<P: AsRef<Path>>(path: P) -> FetchResult<Self> {
    let path = path.as_ref();
    let file = File::open(path)
      .map_err(|e| FetchError::TickerError(format!("{}: {}", path.display(), e)))?;
    let mut reader = Reader::from_reader(file);

    let mut symbols = Vec::new();
    let mut contracts = HashMap::new();

    for result in reader.deserialize() {
      let record: TickerRecord = match result {
        Ok(record) => record,
        Err(e) => {
          warn!("Skipping malformed ticker row: {}", e);
          continue;
        }
      };

      let sec_type: SecType = match record.sec_type.parse() {
        Ok(sec_type) => sec_type,
        Err(e) => {
          warn!("Skipping ticker {}: {}", record.symbol, e);
          continue;
        }
      };

      let contract = Contract {
        symbol: record.symbol.trim().to_uppercase(),
        sec_type,
        exchange: record.exchange.trim().to_string(),
        currency: record.currency.trim().to_string(),
        last_trade_date_or_contract_month: record
          .last_trade_date_or_contract_month
          .filter(|s| !s.trim().is_empty()),
        strike: record.strike,
        right: record.right.filter(|s| !s.trim().is_empty()),
        multiplier: record.multiplier.filter(|s| !s.trim().is_empty()),
      };

      if let Err(e) = contract.validate() {
        warn!("Skipping ticker {}: {}", contract.symbol, e);
        continue;
      }

      if contracts.contains_key(&contract.symbol) {
        warn!("Duplicate ticker {} ignored", contract.symbol);
        continue;
      }

      symbols.push(contract.symbol.clone());
      contracts.insert(contract.symbol.clone(), contract);
    }

    if symbols.is_empty() {
      return Err(FetchError::TickerError(format!(
        "No valid symbols found in {}",
        path.display()
      )));
    }

    info!("Loaded {} symbols from {}", symbols.len(), path.display());
    Ok(Self { symbols, contracts })
  }

  /// All symbols in table order.
  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// Clean a caller-supplied symbol list: trim, upper-case, drop empties
  /// and duplicates, preserving order.
  pub fn normalize_symbols(requested: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    requested
      .iter()
      .map(|s| s.trim().to_uppercase())
      .filter(|s| !s.is_empty() && seen.insert(s.clone()))
      .collect()
  }
}

impl ContractResolver for TickerTable {
  fn resolve(&self, symbol: &str) -> Option<Contract> {
    self.contracts.get(&symbol.trim().to_uppercase()).cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_table(content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut file = File::create(dir.path().join("tickers.csv")).unwrap();
    write!(file, "{content}").unwrap();
    dir
  }

  #[test]
  fn test_load_stock_rows() {
    let dir = write_table(
      "symbol,secType,exchange,currency\nAAPL,STK,SMART,USD\nmsft,STK,SMART,USD\n",
    );
    let table = TickerTable::load(dir.path().join("tickers.csv")).unwrap();
    assert_eq!(table.symbols(), &["AAPL", "MSFT"]);
    assert!(table.resolve("aapl").is_some());
    assert!(table.resolve("GOOG").is_none());
  }

  #[test]
  fn test_load_with_optional_columns() {
    let dir = write_table(
      "symbol,secType,exchange,currency,lastTradeDateOrContractMonth,strike,right,multiplier\n\
       ES,FUT,CME,USD,202506,,,50\n\
       SPY,OPT,SMART,USD,20250620,450,C,100\n",
    );
    let table = TickerTable::load(dir.path().join("tickers.csv")).unwrap();
    assert_eq!(table.len(), 2);

    let es = table.resolve("ES").unwrap();
    assert_eq!(es.sec_type, SecType::Future);
    assert_eq!(es.last_trade_date_or_contract_month.as_deref(), Some("202506"));

    let spy = table.resolve("SPY").unwrap();
    assert_eq!(spy.strike, Some(450.0));
    assert_eq!(spy.right.as_deref(), Some("C"));
  }

  #[test]
  fn test_invalid_rows_are_skipped() {
    // The future is missing its expiry, the bond type is unsupported.
    let dir = write_table(
      "symbol,secType,exchange,currency\nES,FUT,CME,USD\nT,BOND,SMART,USD\nAAPL,STK,SMART,USD\n",
    );
    let table = TickerTable::load(dir.path().join("tickers.csv")).unwrap();
    assert_eq!(table.symbols(), &["AAPL"]);
  }

  #[test]
  fn test_empty_table_is_an_error() {
    let dir = write_table("symbol,secType,exchange,currency\n");
    let result = TickerTable::load(dir.path().join("tickers.csv"));
    assert!(matches!(result, Err(FetchError::TickerError(_))));
  }

  #[test]
  fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = TickerTable::load(dir.path().join("absent.csv"));
    assert!(matches!(result, Err(FetchError::TickerError(_))));
  }

  #[test]
  fn test_duplicate_symbols_keep_first() {
    let dir = write_table(
      "symbol,secType,exchange,currency\nAAPL,STK,SMART,USD\nAAPL,STK,NYSE,USD\n",
    );
    let table = TickerTable::load(dir.path().join("tickers.csv")).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.resolve("AAPL").unwrap().exchange, "SMART");
  }

  #[test]
  fn test_normalize_symbols() {
    let requested =
      vec![" aapl ".to_string(), "MSFT".to_string(), "aapl".to_string(), "".to_string()];
    assert_eq!(TickerTable::normalize_symbols(&requested), vec!["AAPL", "MSFT"]);
  }
}
