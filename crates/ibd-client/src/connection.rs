//! Startup connection bootstrap.

use crate::gateway::MarketDataClient;
use ibd_core::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Connect to the gateway, retrying with exponential backoff.
///
/// Exhausting the attempt budget is a startup-class failure; the caller is
/// expected to exit. A cancellation during the backoff sleep aborts the
/// bootstrap immediately.
pub async fn connect_with_backoff(
  client: &dyn MarketDataClient,
  attempts: u32,
  cancel: &CancellationToken,
) -> Result<()> {
  let attempts = attempts.max(1);
  let mut backoff = Duration::from_secs(1);
  let mut last_error: Option<Error> = None;

  for attempt in 1..=attempts {
    match client.connect().await {
      Ok(()) => {
        info!("Connected to gateway on attempt {}/{}", attempt, attempts);
        return Ok(());
      }
      Err(e) => {
        warn!("Connection attempt {}/{} failed: {}", attempt, attempts, e);
        last_error = Some(e);
      }
    }

    if attempt < attempts {
      tokio::select! {
        _ = cancel.cancelled() => {
          return Err(Error::Connection("Connection bootstrap cancelled".to_string()));
        }
        _ = tokio::time::sleep(backoff) => {}
      }
      backoff = (backoff * 2).min(MAX_BACKOFF);
    }
  }

  Err(Error::Connection(format!(
    "Gateway unreachable after {} attempts: {}",
    attempts,
    last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string())
  )))
}
