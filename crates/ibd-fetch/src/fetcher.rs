//! Single-day fetch pipeline.
//!
//! One (symbol, date) request: pacing wait, gateway call with bounded
//! transport retry, first-bar date assertion, validation, and status
//! derivation. Non-trading days short-circuit before any network call.
//! All waits abort promptly on a graceful stop; an aborted wait surfaces
//! as [`FetchDay::Cancelled`] so nothing is recorded for the date.

use crate::error::{FetchError, FetchResult};
use crate::validator::BarValidator;
use chrono::{DateTime, NaiveDate, Utc};
use ibd_client::{BarRequest, ContractResolver, MarketDataClient, RequestPacer};
use ibd_core::config::RetrySettings;
use ibd_core::{Bar, BarStatus, Contract, DayKind, MarketCalendar};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one archive attempt for a (symbol, date).
#[derive(Debug, Clone)]
pub struct DayOutcome {
  pub status: BarStatus,
  pub bars: Vec<Bar>,
  pub message: String,
  /// False when the failure is an empty-result condition; drives the
  /// retry policy's NO_DATA shortcut.
  pub data_received: bool,
}

impl DayOutcome {
  pub fn is_success(&self) -> bool {
    self.status != BarStatus::Error
  }

  fn holiday() -> Self {
    Self {
      status: BarStatus::Holiday,
      bars: Vec::new(),
      message: "HOLIDAY".to_string(),
      data_received: false,
    }
  }

  fn error(message: impl Into<String>, data_received: bool) -> Self {
    Self { status: BarStatus::Error, bars: Vec::new(), message: message.into(), data_received }
  }
}

/// A fetch either produced an outcome or was cut short by shutdown.
#[derive(Debug)]
pub enum FetchDay {
  Done(DayOutcome),
  Cancelled,
}

enum RequestResult {
  Bars(Vec<Bar>),
  Failed(String),
  Cancelled,
}

/// Rate-limited, retrying, validating day fetcher.
pub struct DayFetcher {
  client: Arc<dyn MarketDataClient>,
  resolver: Arc<dyn ContractResolver>,
  calendar: MarketCalendar,
  validator: BarValidator,
  pacer: Mutex<RequestPacer>,
  retry: RetrySettings,
  request: BarRequest,
  stop: CancellationToken,
}

impl DayFetcher {
  pub fn new(
    client: Arc<dyn MarketDataClient>,
    resolver: Arc<dyn ContractResolver>,
    calendar: MarketCalendar,
    rate_limit_window: Duration,
    retry: RetrySettings,
    stop: CancellationToken,
  ) -> Self {
    Self {
      client,
      resolver,
      validator: BarValidator::new(calendar.clone()),
      calendar,
      pacer: Mutex::new(RequestPacer::new(rate_limit_window)),
      retry,
      request: BarRequest::default(),
      stop,
    }
  }

  /// Fetch and validate one day for a symbol.
  pub async fn fetch_and_validate_day(&self, symbol: &str, date: NaiveDate) -> FetchDay {
    let contract = match self.resolver.resolve(symbol) {
      Some(contract) => contract,
      None => {
        return FetchDay::Done(DayOutcome::error(
          format!("Failed to resolve contract for {symbol}"),
          true,
        ));
      }
    };

    // Non-trading days never hit the network.
    if !self.calendar.is_trading_day(date) {
      info!("Non-trading day for {} on {}", symbol, date);
      return FetchDay::Done(DayOutcome::holiday());
    }

    let end_time = self.calendar.close_utc(date);
    info!(
      "Requesting historical data: {} {} {} ending {} (for date {})",
      symbol, self.request.duration, self.request.bar_size, end_time, date
    );

    let bars = match self.request_with_retry(&contract, end_time, symbol).await {
      RequestResult::Cancelled => return FetchDay::Cancelled,
      RequestResult::Failed(message) => {
        return FetchDay::Done(DayOutcome::error(message, true));
      }
      RequestResult::Bars(bars) => bars,
    };

    if bars.is_empty() {
      info!("No bars returned for {} on {} - treating as holiday", symbol, date);
      return FetchDay::Done(DayOutcome::holiday());
    }

    // The gateway must have answered for the requested day.
    let first_bar_date = bars[0].trading_date();
    if first_bar_date != date {
      let message = format!("Date mismatch: expected {date}, got data for {first_bar_date}");
      error!("{}", message);
      return FetchDay::Done(DayOutcome::error(message, true));
    }

    let validation = self.validator.validate_day(&bars, symbol, date);
    if !validation.is_valid {
      let mut message = format!("Validation failed: {}", validation.message);
      if !validation.error_details.is_empty() {
        message.push_str(&format!(" (Details: {})", validation.error_details.join("; ")));
      }
      error!("Data validation failed for {} on {}: {}", symbol, date, message);
      return FetchDay::Done(DayOutcome::error(message, true));
    }

    let (status, message) = self.derive_status(bars.len() as u32, date);
    if status == BarStatus::Error {
      return FetchDay::Done(DayOutcome::error(message, true));
    }

    info!(
      "Data validation successful for {} on {}: {} bars ({})",
      symbol,
      date,
      bars.len(),
      status
    );
    FetchDay::Done(DayOutcome { status, bars, message, data_received: true })
  }

  /// Derive the ledger status from a successful, validated bar count.
  fn derive_status(&self, bar_count: u32, date: NaiveDate) -> (BarStatus, String) {
    let expected = self.calendar.expected_bars();

    if bar_count == 0 {
      return (BarStatus::Holiday, "HOLIDAY".to_string());
    }
    if bar_count == expected.regular_day {
      return (BarStatus::Complete, "COMPLETE".to_string());
    }
    if expected.early_close.contains(&bar_count) {
      let kind = self.calendar.schedule(date).kind;
      return match kind {
        DayKind::EarlyCloseShort | DayKind::EarlyCloseRegular => {
          (BarStatus::EarlyClose, "EARLY_CLOSE".to_string())
        }
        _ => (
          BarStatus::Error,
          format!("Bar count {bar_count} looks like an early close but {date} is a {kind}"),
        ),
      };
    }
    (BarStatus::Error, format!("Unexpected bar count {bar_count} for {date}"))
  }

  async fn request_with_retry(
    &self,
    contract: &Contract,
    end_time: DateTime<Utc>,
    symbol: &str,
  ) -> RequestResult {
    let max_attempts = self.retry.max_attempts.max(1);
    let mut last_error = String::new();
    let mut pacer = self.pacer.lock().await;

    for attempt in 1..=max_attempts {
      if !pacer.acquire(&self.stop).await {
        return RequestResult::Cancelled;
      }

      let result = self.client.fetch_bars(contract, end_time, &self.request).await;
      pacer.mark_complete();

      match result {
        Ok(bars) => {
          debug!("Successfully received {} bars for {}", bars.len(), symbol);
          return RequestResult::Bars(bars);
        }
        Err(e) => {
          warn!("Request attempt {}/{} failed for {}: {}", attempt, max_attempts, symbol, e);
          last_error = e.to_string();

          if attempt < max_attempts {
            info!("Waiting {}s before retry", self.retry.wait_seconds);
            tokio::select! {
              _ = self.stop.cancelled() => return RequestResult::Cancelled,
              _ = tokio::time::sleep(Duration::from_secs(self.retry.wait_seconds)) => {}
            }
          }
        }
      }
    }

    error!("All {} attempts failed for {}", max_attempts, symbol);
    RequestResult::Failed(last_error)
  }

  /// Earliest archivable date for a symbol, via the gateway's head
  /// timestamp. Shares the pacing window with bar requests.
  pub async fn earliest_data_date(&self, symbol: &str) -> FetchResult<Option<NaiveDate>> {
    let contract = self
      .resolver
      .resolve(symbol)
      .ok_or_else(|| FetchError::TickerError(format!("Failed to resolve contract for {symbol}")))?;

    let mut pacer = self.pacer.lock().await;
    if !pacer.acquire(&self.stop).await {
      return Err(FetchError::ShutdownInProgress);
    }

    info!("Getting earliest data date for {}", symbol);
    let result = self.client.head_timestamp(&contract).await;
    pacer.mark_complete();

    match result {
      Ok(Some(timestamp)) => {
        let earliest = timestamp.date_naive();
        info!("Earliest data date for {}: {}", symbol, earliest);
        Ok(Some(earliest))
      }
      Ok(None) => {
        warn!("No head timestamp received for {}", symbol);
        Ok(None)
      }
      Err(e) => Err(e.into()),
    }
  }
}

impl std::fmt::Debug for DayFetcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DayFetcher").field("retry", &self.retry).field("request", &self.request).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use chrono::TimeZone;
  use ibd_core::config::ExpectedBars;
  use ibd_core::market::calendar::WeekdayCalendar;
  use std::collections::VecDeque;
  use std::sync::Mutex as StdMutex;

  /// Scripted gateway: pops one response per fetch call.
  struct ScriptedGateway {
    responses: StdMutex<VecDeque<ibd_core::Result<Vec<Bar>>>>,
    calls: StdMutex<Vec<DateTime<Utc>>>,
  }

  impl ScriptedGateway {
    fn new(responses: Vec<ibd_core::Result<Vec<Bar>>>) -> Self {
      Self { responses: StdMutex::new(responses.into()), calls: StdMutex::new(Vec::new()) }
    }

    fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl MarketDataClient for ScriptedGateway {
    async fn connect(&self) -> ibd_core::Result<()> {
      Ok(())
    }

    async fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
      true
    }

    async fn fetch_bars(
      &self,
      _contract: &Contract,
      end_time: DateTime<Utc>,
      _request: &BarRequest,
    ) -> ibd_core::Result<Vec<Bar>> {
      self.calls.lock().unwrap().push(end_time);
      self.responses.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn head_timestamp(&self, _contract: &Contract) -> ibd_core::Result<Option<DateTime<Utc>>> {
      Ok(Some(Utc.with_ymd_and_hms(2020, 6, 1, 14, 30, 0).unwrap()))
    }
  }

  struct StaticResolver;

  impl ContractResolver for StaticResolver {
    fn resolve(&self, symbol: &str) -> Option<Contract> {
      if symbol == "MISSING" {
        None
      } else {
        Some(Contract::stock(symbol, "SMART", "USD"))
      }
    }
  }

  // Tuesday
  fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
  }

  fn session(n: usize, on: NaiveDate) -> Vec<Bar> {
    let open_time = Utc.from_utc_datetime(&on.and_hms_opt(14, 30, 0).unwrap());
    (0..n)
      .map(|i| {
        let base = 100.0 + (i as f64) * 0.01;
        Bar {
          timestamp: open_time + chrono::Duration::minutes(i as i64),
          open: base,
          high: base + 0.5,
          low: base - 0.5,
          close: base + 0.1,
          volume: 1000,
          bar_count: 40,
        }
      })
      .collect()
  }

  fn fetcher(gateway: Arc<ScriptedGateway>) -> DayFetcher {
    let calendar = MarketCalendar::new(Arc::new(WeekdayCalendar), ExpectedBars::default());
    DayFetcher::new(
      gateway,
      Arc::new(StaticResolver),
      calendar,
      Duration::from_secs(10),
      RetrySettings { max_attempts: 3, wait_seconds: 5 },
      CancellationToken::new(),
    )
  }

  #[tokio::test(start_paused = true)]
  async fn test_full_day_is_complete() {
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(session(390, date()))]));
    let fetcher = fetcher(gateway.clone());

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Complete);
    assert_eq!(outcome.bars.len(), 390);
    assert!(outcome.is_success());
    assert_eq!(gateway.call_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_request_ends_at_calendar_close() {
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(session(390, date()))]));
    let fetcher = fetcher(gateway.clone());
    fetcher.fetch_and_validate_day("AAPL", date()).await;

    let calls = gateway.calls.lock().unwrap();
    assert_eq!(calls[0], Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap());
  }

  #[tokio::test(start_paused = true)]
  async fn test_weekend_short_circuits_without_network() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let fetcher = fetcher(gateway.clone());
    let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", saturday).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Holiday);
    assert_eq!(gateway.call_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_empty_trading_day_is_holiday() {
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(Vec::new())]));
    let fetcher = fetcher(gateway.clone());

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Holiday);
    assert!(!outcome.data_received);
    assert_eq!(gateway.call_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_error_is_retried_then_succeeds() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
      Err(ibd_core::Error::Connection("connection reset".to_string())),
      Ok(session(390, date())),
    ]));
    let fetcher = fetcher(gateway.clone());

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Complete);
    assert_eq!(gateway.call_count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_persistent_error_exhausts_attempts() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
      Err(ibd_core::Error::Gateway("no historical data".to_string())),
      Err(ibd_core::Error::Gateway("no historical data".to_string())),
      Err(ibd_core::Error::Gateway("no historical data".to_string())),
    ]));
    let fetcher = fetcher(gateway.clone());

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Error);
    assert!(outcome.message.contains("no historical data"));
    assert_eq!(gateway.call_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_wrong_day_from_gateway_is_a_hard_failure() {
    let wrong_day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(session(390, wrong_day))]));
    let fetcher = fetcher(gateway);

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Error);
    assert!(outcome.message.contains("Date mismatch"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalid_bar_count_fails_validation() {
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(session(17, date()))]));
    let fetcher = fetcher(gateway);

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Error);
    assert!(outcome.message.contains("Validation failed"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_early_close_count_on_regular_day() {
    // 360 bars on a regular calendar day: accepted by validation, but the
    // day is not an early close, so the derived status is an error.
    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(session(360, date()))]));
    let fetcher = fetcher(gateway);

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("AAPL", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Error);
    assert!(outcome.message.contains("early close"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_missing_contract_is_an_error_outcome() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let fetcher = fetcher(gateway.clone());

    let FetchDay::Done(outcome) = fetcher.fetch_and_validate_day("MISSING", date()).await else {
      panic!("expected an outcome");
    };
    assert_eq!(outcome.status, BarStatus::Error);
    assert!(outcome.message.contains("resolve contract"));
    assert_eq!(gateway.call_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_requests_are_paced() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
      Ok(session(390, date())),
      Ok(session(390, date())),
    ]));
    let fetcher = fetcher(gateway.clone());

    let before = tokio::time::Instant::now();
    fetcher.fetch_and_validate_day("AAPL", date()).await;
    fetcher.fetch_and_validate_day("AAPL", date()).await;
    let elapsed = tokio::time::Instant::now() - before;

    // The second request waits out the 10s window.
    assert!(elapsed >= Duration::from_secs(10));
    assert_eq!(gateway.call_count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_during_retry_wait() {
    let stop = CancellationToken::new();
    let gateway = Arc::new(ScriptedGateway::new(vec![
      Err(ibd_core::Error::Connection("connection reset".to_string())),
      Ok(session(390, date())),
    ]));
    let calendar = MarketCalendar::new(Arc::new(WeekdayCalendar), ExpectedBars::default());
    let fetcher = DayFetcher::new(
      gateway.clone(),
      Arc::new(StaticResolver),
      calendar,
      Duration::from_secs(10),
      RetrySettings { max_attempts: 3, wait_seconds: 60 },
      stop.clone(),
    );

    let handle = tokio::spawn(async move { fetcher.fetch_and_validate_day("AAPL", date()).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    stop.cancel();

    match handle.await.unwrap() {
      FetchDay::Cancelled => {}
      FetchDay::Done(outcome) => panic!("expected cancellation, got {:?}", outcome.status),
    }
    // Only the first attempt went out.
    assert_eq!(gateway.call_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_earliest_data_date() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let fetcher = fetcher(gateway);

    let earliest = fetcher.earliest_data_date("AAPL").await.unwrap();
    assert_eq!(earliest, Some(NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()));
  }
}
