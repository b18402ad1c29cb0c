//! Periodic progress reporting.
//!
//! A background task that reads the scheduler's published snapshot and
//! emits one line per interval while a job is active. Sleeps in one-second
//! slices so a stop cancels it promptly. Strictly read-only.

use crate::progress::format_duration;
use crate::scheduler::SharedProgress;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Low-frequency progress emitter.
pub struct Reporter {
  interval: Duration,
  progress: SharedProgress,
  cancel: CancellationToken,
  handle: Option<JoinHandle<()>>,
}

impl Reporter {
  pub fn new(interval: Duration, progress: SharedProgress) -> Self {
    Self { interval, progress, cancel: CancellationToken::new(), handle: None }
  }

  /// Spawn the reporting task.
  pub fn start(&mut self) {
    if self.handle.is_some() {
      debug!("Progress reporting is already running");
      return;
    }

    let interval = self.interval;
    let progress = self.progress.clone();
    let cancel = self.cancel.clone();

    self.handle = Some(tokio::spawn(async move {
      loop {
        let snapshot = progress.lock().expect("progress lock poisoned").clone();
        if let Some(job) = snapshot {
          let eta = job
            .symbol_eta
            .map(format_duration)
            .map(|eta| format!(" | Symbol ETA: {eta}"))
            .unwrap_or_default();
          info!(
            "Progress for {}: {}/{} dates ({:.1}% complete, {:.1}% success rate) - Current: {}{}",
            job.symbol,
            job.completed_dates,
            job.total_dates,
            job.completion_percentage(),
            job.success_rate(),
            job.current_date.map(|d| d.to_string()).unwrap_or_else(|| "None".to_string()),
            eta
          );
        }

        // Sleep the interval in one-second slices to stay responsive.
        let mut remaining = interval;
        while remaining > Duration::ZERO {
          let slice = remaining.min(Duration::from_secs(1));
          tokio::select! {
            _ = cancel.cancelled() => {
              debug!("Progress reporting stopped");
              return;
            }
            _ = tokio::time::sleep(slice) => {}
          }
          remaining = remaining.saturating_sub(slice);
        }
      }
    }));
  }

  /// Cancel the task and wait for it to drain.
  pub async fn stop(&mut self) {
    self.cancel.cancel();
    if let Some(handle) = self.handle.take() {
      let _ = handle.await;
    }
  }
}

impl std::fmt::Debug for Reporter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Reporter")
      .field("interval", &self.interval)
      .field("running", &self.handle.is_some())
      .finish()
  }
}
