//! The `fetch` command: wire everything up and drain the symbol queue.

use anyhow::{Result, bail};
use clap::Args;
use ibd_client::{MarketDataClient, SimGateway, connect_with_backoff};
use ibd_core::{
  DEFAULT_PER_DATE_TIMEOUT_SECS, FORCED_STOP_GRACE_SECS, MarketCalendar,
};
use ibd_fetch::{
  BarStore, DatePlanner, DayFetcher, Ledger, ProgressTracker, Reporter, RetryPolicy, Scheduler,
  ShutdownController, TickerTable,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Args, Debug)]
pub struct FetchCommand {
  /// Symbols to fetch (defaults to all symbols from the ticker table)
  pub symbols: Vec<String>,

  /// Environment name (dev/test/prod) or path to a settings file
  #[arg(long, default_value = "dev")]
  pub config: String,

  /// Progress update interval in seconds
  #[arg(long, default_value_t = 30)]
  pub progress_interval: u64,

  /// Show what would be processed without fetching anything
  #[arg(long)]
  pub dry_run: bool,

  /// Reduce logging output to warnings and errors
  #[arg(long)]
  pub quiet: bool,
}

/// Run the fetch command; the returned code becomes the process exit code
/// (0 = normal or graceful stop, 1 = error or forced stop).
pub async fn execute(cmd: FetchCommand) -> Result<i32> {
  let (config, environment) = crate::config::resolve(&cmd.config)?;
  let _log_guard = crate::logging::init(&config, cmd.quiet);

  info!("=== IBD Data Fetcher Starting ===");
  info!("Configuration: {} (environment: {})", cmd.config, environment);

  let tickers_path = config.paths.config_dir.join("tickers.csv");
  let table = Arc::new(TickerTable::load(&tickers_path)?);

  let symbols: Vec<String> = if cmd.symbols.is_empty() {
    table.symbols().to_vec()
  } else {
    TickerTable::normalize_symbols(&cmd.symbols)
  };
  if symbols.is_empty() {
    bail!("No symbols to process");
  }
  info!("Symbols to process: {}", symbols.join(", "));

  let ledger = Ledger::new(&config.paths.data_dir);

  if cmd.dry_run {
    info!("=== DRY RUN MODE ===");
    info!("Would process {} symbols", symbols.len());
    for symbol in &symbols {
      print_symbol_summary(&ledger, symbol);
    }
    info!("=== DRY RUN COMPLETE ===");
    return Ok(0);
  }

  info!("Graceful shutdown: enabled (Ctrl+C to stop gracefully)");
  let shutdown = ShutdownController::new(Duration::from_secs(FORCED_STOP_GRACE_SECS));
  shutdown.clone().listen_for_signals();

  let client: Arc<dyn MarketDataClient> = match config.connection.transport.as_str() {
    "sim" => Arc::new(SimGateway::new()),
    other => bail!(
      "Unknown gateway transport '{other}'; the TWS socket transport plugs in as an \
       external integration"
    ),
  };

  if let Err(e) = connect_with_backoff(
    client.as_ref(),
    config.connection.reconnection_attempts,
    shutdown.stop_token(),
  )
  .await
  {
    error!("Failed to connect to gateway: {}", e);
    return Ok(1);
  }

  // No exchange-calendar binding is wired in; the adapter assumes plain
  // business days rather than refusing to fetch.
  let calendar = MarketCalendar::fallback(config.validation.expected_bars.clone());

  let fetcher = Arc::new(DayFetcher::new(
    client.clone(),
    table.clone(),
    calendar.clone(),
    config.rate_limit.window(),
    config.retry.clone(),
    shutdown.stop_token().clone(),
  ));

  let mut scheduler = Scheduler::new(
    fetcher,
    DatePlanner::new(calendar.clone()),
    calendar,
    ledger.clone(),
    BarStore::new(&config.paths.data_dir),
    RetryPolicy::new(&config.failure_handling),
    ProgressTracker::new(config.rate_limit.window()),
    shutdown.clone(),
    Duration::from_secs(DEFAULT_PER_DATE_TIMEOUT_SECS),
  );

  let mut reporter =
    Reporter::new(Duration::from_secs(cmd.progress_interval), scheduler.progress_handle());
  reporter.start();

  let report = scheduler.run(&symbols).await;

  reporter.stop().await;
  client.disconnect().await;
  shutdown.mark_stopped();

  if report.stopped_early {
    warn!("=== SESSION STOPPED GRACEFULLY ===");
    info!("Reason: {}", shutdown.reason().unwrap_or_else(|| "unknown".to_string()));
  } else {
    info!("=== ALL JOBS COMPLETED ===");
  }

  info!("Final summary:");
  let mut total_completed = 0;
  let mut total_errors = 0;
  let mut total_dates = 0;
  for symbol in &symbols {
    let summary = print_symbol_summary(&ledger, symbol);
    total_completed += summary.completed;
    total_errors += summary.errors;
    total_dates += summary.total_dates;
  }
  info!("Overall: {}/{} dates completed, {} errors", total_completed, total_dates, total_errors);

  if let Some(perf) = scheduler.tracker().performance_summary() {
    info!(
      "Performance: {} symbols completed, avg {} per symbol (fastest: {}, slowest: {})",
      perf.completed_symbols,
      ibd_fetch::format_duration(perf.avg_symbol_duration),
      perf.fastest_symbol,
      perf.slowest_symbol
    );
  }

  let retries = scheduler.retry_policy().overall_summary();
  if retries.total_failed_dates > 0 {
    info!(
      "Retry statistics: {} failed dates across {} symbols ({} no-data, {} symbols skipped)",
      retries.total_failed_dates,
      retries.symbols_tracked,
      retries.no_data_failures,
      retries.symbols_skipped
    );
  }

  if report.stopped_early {
    info!("To resume processing, run the same command again");
  }

  Ok(if shutdown.was_forced() { 1 } else { 0 })
}

fn print_symbol_summary(ledger: &Ledger, symbol: &str) -> ibd_fetch::LedgerSummary {
  let summary = ledger.summary(symbol);
  info!(
    "{}: {} total dates, {} completed, {} errors ({:.1}% success) - Oldest success: {}",
    summary.symbol,
    summary.total_dates,
    summary.completed,
    summary.errors,
    summary.success_rate,
    summary.oldest_success.map(|d| d.to_string()).unwrap_or_else(|| "Never".to_string())
  );
  summary
}
