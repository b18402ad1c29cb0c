//! Logging initialization.
//!
//! Console output plus a daily-rolling file under `logs/daily/`.
//! Size-based rotation (`max_size_mb`, `backup_count`) is delegated to
//! external tooling; the config keys ride along for it.

use ibd_core::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the global subscriber. The returned guard must live until
/// process exit to flush the file writer.
pub fn init(config: &Config, quiet: bool) -> Option<WorkerGuard> {
  let level = if quiet { "warn" } else { config.logging.level.as_str() };
  let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

  let daily_dir = config.paths.log_dir.join("daily");
  let file_layer = match std::fs::create_dir_all(&daily_dir) {
    Ok(()) => {
      let appender = tracing_appender::rolling::daily(&daily_dir, "ibd.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      Some((fmt::layer().with_writer(writer).with_ansi(false), guard))
    }
    Err(e) => {
      eprintln!("Warning: cannot create log directory {}: {}", daily_dir.display(), e);
      None
    }
  };

  match file_layer {
    Some((layer, guard)) => {
      tracing_subscriber::registry().with(filter).with(fmt::layer()).with(layer).init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
      None
    }
  }
}
