use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FetchError {
  #[error("Gateway error: {0}")]
  GatewayError(String),

  #[error("CSV parsing error: {0}")]
  CsvError(String),

  #[error("IO error: {0}")]
  IoError(String),

  #[error("Ledger error: {0}")]
  LedgerError(String),

  #[error("Ticker table error: {0}")]
  TickerError(String),

  #[error("Invalid data: {0}")]
  InvalidData(String),

  #[error("Configuration error: {0}")]
  ConfigurationError(String),

  #[error("Shutdown in progress")]
  ShutdownInProgress,
}

// Implement conversions manually
impl From<csv::Error> for FetchError {
  fn from(err: csv::Error) -> Self {
    FetchError::CsvError(err.to_string())
  }
}

impl From<std::io::Error> for FetchError {
  fn from(err: std::io::Error) -> Self {
    FetchError::IoError(err.to_string())
  }
}

impl From<ibd_core::Error> for FetchError {
  fn from(err: ibd_core::Error) -> Self {
    FetchError::GatewayError(err.to_string())
  }
}

pub type FetchResult<T> = Result<T, FetchError>;
