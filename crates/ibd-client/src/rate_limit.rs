//! Outbound request pacing.
//!
//! The gateway allows one historical request per pacing window (10 s by
//! default), measured from the completion of the previous request. The
//! pacer suspends cooperatively and unblocks promptly on shutdown.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Enforces a minimum interval between gateway requests.
#[derive(Debug)]
pub struct RequestPacer {
  window: Duration,
  last_completed: Option<Instant>,
}

impl RequestPacer {
  pub fn new(window: Duration) -> Self {
    Self { window, last_completed: None }
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  /// Suspend until the pacing window has elapsed since the previous
  /// request's completion. Returns `false` when the wait was cut short by
  /// cancellation; the caller must not issue the request in that case.
  pub async fn acquire(&mut self, cancel: &CancellationToken) -> bool {
    if let Some(last) = self.last_completed {
      let elapsed = last.elapsed();
      if elapsed < self.window {
        let wait = self.window - elapsed;
        debug!("Rate limiting: waiting {:.2}s", wait.as_secs_f64());
        tokio::select! {
          _ = cancel.cancelled() => return false,
          _ = tokio::time::sleep(wait) => {}
        }
      }
    }
    true
  }

  /// Stamp the completion of a request; the next window starts now.
  pub fn mark_complete(&mut self) {
    self.last_completed = Some(Instant::now());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_first_acquire_does_not_wait() {
    let mut pacer = RequestPacer::new(Duration::from_secs(10));
    let cancel = CancellationToken::new();
    let before = Instant::now();
    assert!(pacer.acquire(&cancel).await);
    assert_eq!(Instant::now(), before);
  }

  #[tokio::test(start_paused = true)]
  async fn test_acquire_waits_full_window_after_completion() {
    let mut pacer = RequestPacer::new(Duration::from_secs(10));
    let cancel = CancellationToken::new();

    pacer.mark_complete();
    let before = Instant::now();
    assert!(pacer.acquire(&cancel).await);
    assert!(Instant::now() - before >= Duration::from_secs(10));
  }

  #[tokio::test(start_paused = true)]
  async fn test_acquire_waits_only_the_remainder() {
    let mut pacer = RequestPacer::new(Duration::from_secs(10));
    let cancel = CancellationToken::new();

    pacer.mark_complete();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let before = Instant::now();
    assert!(pacer.acquire(&cancel).await);
    let waited = Instant::now() - before;
    assert!(waited >= Duration::from_secs(4));
    assert!(waited < Duration::from_secs(5));
  }

  #[tokio::test(start_paused = true)]
  async fn test_acquire_unblocks_on_cancellation() {
    let mut pacer = RequestPacer::new(Duration::from_secs(10));
    let cancel = CancellationToken::new();
    pacer.mark_complete();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_secs(1)).await;
      cancel_clone.cancel();
    });

    let before = Instant::now();
    assert!(!pacer.acquire(&cancel).await);
    assert!(Instant::now() - before < Duration::from_secs(2));
  }
}
