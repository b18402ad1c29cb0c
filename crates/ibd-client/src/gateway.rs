//! The gateway seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ibd_core::{Bar, Contract, Result};

/// Parameters of a historical-bar request.
///
/// Defaults match the archiver's shape of work: one calendar day of
/// one-minute trade bars, regular trading hours only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRequest {
  pub duration: String,
  pub bar_size: String,
  pub what_to_show: String,
  pub use_rth: bool,
}

impl Default for BarRequest {
  fn default() -> Self {
    Self {
      duration: "1 D".to_string(),
      bar_size: "1 min".to_string(),
      what_to_show: "TRADES".to_string(),
      use_rth: true,
    }
  }
}

/// A market-data gateway session.
///
/// All methods are invoked serially by the single worker; implementations
/// own the underlying connection and may assume no overlapping calls.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
  /// Establish the gateway session.
  async fn connect(&self) -> Result<()>;

  /// Tear down the session. Idempotent.
  async fn disconnect(&self);

  fn is_connected(&self) -> bool;

  /// Fetch bars for the request window ending at `end_time` (UTC).
  ///
  /// An empty vector means the gateway answered with no data for the
  /// window, which is a valid response (holiday, or history that does not
  /// exist); transport and API problems are errors.
  async fn fetch_bars(
    &self,
    contract: &Contract,
    end_time: DateTime<Utc>,
    request: &BarRequest,
  ) -> Result<Vec<Bar>>;

  /// Earliest timestamp for which the gateway has history, if any.
  async fn head_timestamp(&self, contract: &Contract) -> Result<Option<DateTime<Utc>>>;
}

/// Turns a plain symbol into a gateway contract.
pub trait ContractResolver: Send + Sync {
  fn resolve(&self, symbol: &str) -> Option<Contract>;
}
