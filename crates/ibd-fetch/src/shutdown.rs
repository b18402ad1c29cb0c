//! Graceful shutdown control.
//!
//! Two cancellation tokens drive the protocol: `stop` is the cooperative
//! signal the worker observes at every loop boundary (and which unblocks
//! pacing and inter-retry sleeps), `force` cancels outstanding work. A
//! watcher task armed at construction fires the force token when the
//! grace period elapses after a stop request; a second trigger escalates
//! immediately. Signal handlers do the minimum: they call
//! [`ShutdownController::request_stop`] and nothing else.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{info, warn};

/// Shutdown protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
  Running,
  StopRequested,
  Stopping,
  Stopped,
}

/// Coordinates cooperative stop between the signal listener, the forced
/// stop watcher, and the scheduler.
///
/// Construction spawns the watcher task, so a controller must be created
/// inside a tokio runtime.
pub struct ShutdownController {
  state: Mutex<ShutdownState>,
  reason: Mutex<Option<String>>,
  stop: CancellationToken,
  force: CancellationToken,
  grace: Duration,
}

impl ShutdownController {
  pub fn new(grace: Duration) -> Arc<Self> {
    let controller = Arc::new(Self {
      state: Mutex::new(ShutdownState::Running),
      reason: Mutex::new(None),
      stop: CancellationToken::new(),
      force: CancellationToken::new(),
      grace,
    });

    let watcher = controller.clone();
    tokio::spawn(async move {
      watcher.stop.cancelled().await;
      tokio::time::sleep(watcher.grace).await;
      if watcher.state() != ShutdownState::Stopped {
        warn!(
          "Graceful shutdown exceeded {:.0}s grace period, cancelling outstanding work",
          watcher.grace.as_secs_f64()
        );
        watcher.force.cancel();
      }
    });

    controller
  }

  /// Request a stop. The first call moves to STOP_REQUESTED, wakes all
  /// cooperative waits, and starts the grace clock; a repeat call
  /// escalates to immediate cancellation of outstanding work.
  pub fn request_stop(&self, reason: &str) {
    let mut state = self.state.lock().expect("shutdown state poisoned");
    match *state {
      ShutdownState::Running => {
        *state = ShutdownState::StopRequested;
        drop(state);

        *self.reason.lock().expect("shutdown reason poisoned") = Some(reason.to_string());
        info!("Stop requested ({}), initiating graceful shutdown", reason);
        self.stop.cancel();
      }
      ShutdownState::StopRequested | ShutdownState::Stopping => {
        drop(state);
        warn!("Second stop trigger ({}), cancelling outstanding work now", reason);
        self.force.cancel();
      }
      ShutdownState::Stopped => {}
    }
  }

  /// Spawn the OS signal listener (INT, TERM). Repeat signals escalate.
  pub fn listen_for_signals(self: Arc<Self>) {
    tokio::spawn(async move {
      #[cfg(unix)]
      {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
          Ok(sigterm) => sigterm,
          Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            return;
          }
        };
        loop {
          tokio::select! {
            _ = tokio::signal::ctrl_c() => self.request_stop("Received SIGINT signal"),
            _ = sigterm.recv() => self.request_stop("Received SIGTERM signal"),
          }
        }
      }
      #[cfg(not(unix))]
      {
        loop {
          if tokio::signal::ctrl_c().await.is_err() {
            return;
          }
          self.request_stop("Received interrupt signal");
        }
      }
    });
  }

  pub fn state(&self) -> ShutdownState {
    *self.state.lock().expect("shutdown state poisoned")
  }

  pub fn reason(&self) -> Option<String> {
    self.reason.lock().expect("shutdown reason poisoned").clone()
  }

  /// The scheduler is draining its current work.
  pub fn mark_stopping(&self) {
    let mut state = self.state.lock().expect("shutdown state poisoned");
    if *state == ShutdownState::StopRequested {
      *state = ShutdownState::Stopping;
    }
  }

  /// The worker has fully stopped; the forced-stop watcher stands down.
  pub fn mark_stopped(&self) {
    *self.state.lock().expect("shutdown state poisoned") = ShutdownState::Stopped;
  }

  pub fn is_stop_requested(&self) -> bool {
    self.stop.is_cancelled()
  }

  /// Resolves when a graceful stop is requested. Used to unblock pacing
  /// waits and inter-retry sleeps promptly.
  pub fn stop_requested(&self) -> WaitForCancellationFuture<'_> {
    self.stop.cancelled()
  }

  /// Token observed by waits that must abort on graceful stop.
  pub fn stop_token(&self) -> &CancellationToken {
    &self.stop
  }

  /// Resolves when outstanding work must be abandoned.
  pub fn force_cancelled(&self) -> WaitForCancellationFuture<'_> {
    self.force.cancelled()
  }

  pub fn is_force_cancelled(&self) -> bool {
    self.force.is_cancelled()
  }

  /// True when the run ended through the forced path (exit code 1).
  pub fn was_forced(&self) -> bool {
    self.force.is_cancelled()
  }
}

impl std::fmt::Debug for ShutdownController {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ShutdownController")
      .field("state", &self.state())
      .field("grace", &self.grace)
      .field("stop_requested", &self.is_stop_requested())
      .field("forced", &self.is_force_cancelled())
      .finish()
  }
}
