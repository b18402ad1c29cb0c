//! Environment-aware configuration.
//!
//! Settings are loaded once at startup from `config/settings-{env}.yaml`
//! (falling back to `config/settings.yaml`) and the resulting [`Config`]
//! value is injected into each component. Environment variables override
//! the file on construction; nothing reads the environment afterwards.

use crate::error::{Error, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deployment environment, selected by `IBD_ENVIRONMENT` / `ENVIRONMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
  #[default]
  Dev,
  Test,
  Prod,
}

impl Environment {
  /// Detect the environment from `IBD_ENVIRONMENT`, then `ENVIRONMENT`,
  /// defaulting to `Dev`.
  pub fn detect() -> Self {
    env::var("IBD_ENVIRONMENT")
      .or_else(|_| env::var("ENVIRONMENT"))
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or_default()
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Environment::Dev => "dev",
      Environment::Test => "test",
      Environment::Prod => "prod",
    }
  }
}

impl std::str::FromStr for Environment {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "dev" | "development" => Ok(Environment::Dev),
      "test" => Ok(Environment::Test),
      "prod" | "production" => Ok(Environment::Prod),
      other => Err(Error::Config(format!("Unknown environment: {other}"))),
    }
  }
}

impl std::fmt::Display for Environment {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Gateway endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
  /// Transport selector. `sim` is the built-in deterministic transport;
  /// a production TWS transport registers under its own name.
  pub transport: String,
  pub host: String,
  pub port: u16,
  pub client_id: i32,
  /// Connect timeout in seconds.
  pub timeout: u64,
  /// Startup connection attempts before giving up.
  pub reconnection_attempts: u32,
}

impl Default for ConnectionSettings {
  fn default() -> Self {
    Self {
      transport: "sim".to_string(),
      host: "127.0.0.1".to_string(),
      port: 7497,
      client_id: 1,
      timeout: 30,
      reconnection_attempts: 3,
    }
  }
}

/// Outbound request pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
  /// Sustained request rate; the pacing window is its reciprocal.
  pub requests_per_second: f64,
}

impl Default for RateLimitSettings {
  fn default() -> Self {
    Self { requests_per_second: 1.0 / crate::DEFAULT_RATE_LIMIT_SECS as f64 }
  }
}

impl RateLimitSettings {
  /// Minimum wall-clock interval between gateway requests.
  pub fn window(&self) -> Duration {
    if self.requests_per_second <= 0.0 {
      return Duration::from_secs(crate::DEFAULT_RATE_LIMIT_SECS);
    }
    Duration::from_secs_f64(1.0 / self.requests_per_second)
  }
}

/// Per-request retry budget inside the fetcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
  pub max_attempts: u32,
  pub wait_seconds: u64,
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self { max_attempts: 3, wait_seconds: 5 }
  }
}

/// Expected one-minute bar counts per session kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExpectedBars {
  pub regular_day: u32,
  pub early_close: Vec<u32>,
  pub holiday: u32,
}

impl Default for ExpectedBars {
  fn default() -> Self {
    Self {
      regular_day: crate::REGULAR_DAY_BARS,
      early_close: crate::EARLY_CLOSE_BARS.to_vec(),
      holiday: 0,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationSettings {
  pub expected_bars: ExpectedBars,
}

/// Symbol/date abandonment thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailureHandlingSettings {
  pub max_consecutive_no_data_days: u32,
  pub max_retries_per_date: u32,
}

impl Default for FailureHandlingSettings {
  fn default() -> Self {
    Self { max_consecutive_no_data_days: 10, max_retries_per_date: 3 }
  }
}

/// Logging sink settings. Size-based rotation is an external concern;
/// `max_size_mb` and `backup_count` are carried for the rotation tooling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
  pub level: String,
  pub max_size_mb: u64,
  pub backup_count: u32,
}

impl Default for LoggingSettings {
  fn default() -> Self {
    Self { level: "info".to_string(), max_size_mb: 10, backup_count: 5 }
  }
}

/// On-disk layout roots.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
  pub data_dir: PathBuf,
  pub config_dir: PathBuf,
  pub log_dir: PathBuf,
}

impl Default for PathSettings {
  fn default() -> Self {
    Self {
      data_dir: PathBuf::from("data"),
      config_dir: PathBuf::from("config"),
      log_dir: PathBuf::from("logs"),
    }
  }
}

/// Main configuration for the archiver.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
  pub connection: ConnectionSettings,
  pub rate_limit: RateLimitSettings,
  pub retry: RetrySettings,
  pub validation: ValidationSettings,
  pub failure_handling: FailureHandlingSettings,
  pub logging: LoggingSettings,
  pub paths: PathSettings,
}

impl Config {
  /// Load configuration for an environment.
  ///
  /// Tries `settings-{env}.yaml` in the config directory first, then
  /// `settings.yaml`. Environment-variable overrides are applied last.
  pub fn load(environment: Environment, config_dir: Option<&Path>) -> Result<Self> {
    dotenv().ok();

    let dir = config_dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("config"));
    let env_path = dir.join(format!("settings-{}.yaml", environment.as_str()));
    let base_path = dir.join("settings.yaml");

    let path = if env_path.exists() {
      env_path
    } else if base_path.exists() {
      base_path
    } else {
      return Err(Error::Config(format!(
        "No settings file found in {} (looked for settings-{}.yaml and settings.yaml)",
        dir.display(),
        environment.as_str()
      )));
    };

    let raw = std::fs::read_to_string(&path)?;
    let mut config: Config = serde_yaml::from_str(&raw)?;
    tracing::info!("Loaded configuration from {}", path.display());

    config.apply_env_overrides()?;
    Ok(config)
  }

  /// Load configuration from an explicit settings file.
  pub fn load_path(path: &Path) -> Result<Self> {
    dotenv().ok();

    if !path.exists() {
      return Err(Error::Config(format!("Settings file not found: {}", path.display())));
    }
    let raw = std::fs::read_to_string(path)?;
    let mut config: Config = serde_yaml::from_str(&raw)?;
    tracing::info!("Loaded configuration from {}", path.display());

    config.apply_env_overrides()?;
    Ok(config)
  }

  /// Apply `IBD_*` environment-variable overrides on top of file settings.
  fn apply_env_overrides(&mut self) -> Result<()> {
    if let Ok(host) = env::var("IBD_HOST") {
      self.connection.host = host;
    }
    if let Ok(port) = env::var("IBD_PORT") {
      self.connection.port =
        port.parse().map_err(|_| Error::Config(format!("Invalid IBD_PORT: {port}")))?;
    }
    if let Ok(client_id) = env::var("IBD_CLIENT_ID") {
      self.connection.client_id = client_id
        .parse()
        .map_err(|_| Error::Config(format!("Invalid IBD_CLIENT_ID: {client_id}")))?;
    }
    if let Ok(level) = env::var("IBD_LOG_LEVEL") {
      self.logging.level = level;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_environment_from_str() {
    assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
    assert_eq!("TEST".parse::<Environment>().unwrap(), Environment::Test);
    assert_eq!("production".parse::<Environment>().unwrap(), Environment::Prod);
    assert!("staging".parse::<Environment>().is_err());
  }

  #[test]
  fn test_default_rate_limit_window_is_ten_seconds() {
    let settings = RateLimitSettings::default();
    assert_eq!(settings.window(), Duration::from_secs(10));
  }

  #[test]
  fn test_zero_rate_falls_back_to_default_window() {
    let settings = RateLimitSettings { requests_per_second: 0.0 };
    assert_eq!(settings.window(), Duration::from_secs(10));
  }

  #[test]
  fn test_default_expected_bars() {
    let bars = ExpectedBars::default();
    assert_eq!(bars.regular_day, 390);
    assert_eq!(bars.early_close, vec![360, 210]);
    assert_eq!(bars.holiday, 0);
  }

  #[test]
  fn test_load_missing_config_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(Environment::Dev, Some(dir.path()));
    assert!(matches!(result, Err(Error::Config(_))));
  }

  #[test]
  fn test_load_partial_yaml_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("settings.yaml")).unwrap();
    writeln!(file, "connection:\n  host: gateway.example\n  port: 4002").unwrap();
    drop(file);

    let config = Config::load(Environment::Dev, Some(dir.path())).unwrap();
    assert_eq!(config.connection.host, "gateway.example");
    assert_eq!(config.connection.port, 4002);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.failure_handling.max_consecutive_no_data_days, 10);
  }

  #[test]
  fn test_environment_specific_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("settings.yaml"), "connection:\n  client_id: 1\n").unwrap();
    std::fs::write(dir.path().join("settings-test.yaml"), "connection:\n  client_id: 9\n")
      .unwrap();

    let config = Config::load(Environment::Test, Some(dir.path())).unwrap();
    assert_eq!(config.connection.client_id, 9);
  }
}
