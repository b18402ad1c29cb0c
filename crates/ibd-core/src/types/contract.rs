//! Instrument contracts.
//!
//! A contract uniquely identifies a tradable instrument for the gateway.
//! Each security type needs different fields complete before a request can
//! be made, so construction validates per type.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Supported security types from the ticker table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecType {
  #[serde(rename = "STK")]
  Stock,
  #[serde(rename = "FUT")]
  Future,
  #[serde(rename = "OPT")]
  Option,
}

impl std::fmt::Display for SecType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SecType::Stock => write!(f, "STK"),
      SecType::Future => write!(f, "FUT"),
      SecType::Option => write!(f, "OPT"),
    }
  }
}

impl std::str::FromStr for SecType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "STK" => Ok(SecType::Stock),
      "FUT" => Ok(SecType::Future),
      "OPT" => Ok(SecType::Option),
      other => Err(Error::InvalidContract(format!("Unsupported security type: {other}"))),
    }
  }
}

/// A fully specified instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
  pub symbol: String,
  pub sec_type: SecType,
  pub exchange: String,
  pub currency: String,
  /// Expiry (futures) or contract month, `YYYYMM` or `YYYYMMDD`.
  pub last_trade_date_or_contract_month: Option<String>,
  pub strike: Option<f64>,
  /// Option right, `C` or `P`.
  pub right: Option<String>,
  pub multiplier: Option<String>,
}

impl Contract {
  /// A plain stock contract.
  pub fn stock(symbol: &str, exchange: &str, currency: &str) -> Self {
    Self {
      symbol: symbol.trim().to_uppercase(),
      sec_type: SecType::Stock,
      exchange: exchange.to_string(),
      currency: currency.to_string(),
      last_trade_date_or_contract_month: None,
      strike: None,
      right: None,
      multiplier: None,
    }
  }

  /// Check the contract is complete for its security type.
  pub fn validate(&self) -> Result<()> {
    if self.symbol.is_empty() {
      return Err(Error::InvalidContract("empty symbol".to_string()));
    }
    if !self.symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
      return Err(Error::InvalidContract(format!("malformed symbol: {}", self.symbol)));
    }
    if self.exchange.is_empty() {
      return Err(Error::InvalidContract(format!("{}: empty exchange", self.symbol)));
    }
    if self.currency.is_empty() {
      return Err(Error::InvalidContract(format!("{}: empty currency", self.symbol)));
    }

    match self.sec_type {
      SecType::Stock => Ok(()),
      SecType::Future => {
        if self.last_trade_date_or_contract_month.as_deref().unwrap_or("").is_empty() {
          return Err(Error::InvalidContract(format!(
            "{}: FUT requires lastTradeDateOrContractMonth",
            self.symbol
          )));
        }
        Ok(())
      }
      SecType::Option => {
        if self.last_trade_date_or_contract_month.as_deref().unwrap_or("").is_empty() {
          return Err(Error::InvalidContract(format!(
            "{}: OPT requires lastTradeDateOrContractMonth",
            self.symbol
          )));
        }
        match self.strike {
          Some(strike) if strike > 0.0 => {}
          _ => {
            return Err(Error::InvalidContract(format!(
              "{}: OPT requires a positive strike",
              self.symbol
            )));
          }
        }
        match self.right.as_deref() {
          Some("C") | Some("P") => Ok(()),
          _ => {
            Err(Error::InvalidContract(format!("{}: OPT right must be C or P", self.symbol)))
          }
        }
      }
    }
  }
}
