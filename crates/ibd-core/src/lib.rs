//! # ibd-core
//!
//! Core types, configuration, and error handling for the IBD bar archiver.
//!
//! This crate provides the foundational components shared across all IBD crates:
//!
//! - [`Config`] - environment-aware configuration (gateway endpoint, rate
//!   limits, retry budgets, validation expectations)
//! - [`Error`] and [`Result`] - unified error handling
//! - [`Bar`], [`Contract`], [`BarStatus`] - domain types
//! - [`MarketCalendar`] - trading-session classification and date ranges

pub mod config;
pub mod error;
pub mod market;
pub mod types;

pub use config::{Config, Environment};
pub use error::{Error, Result};
pub use market::calendar::{DayKind, DaySchedule, MarketCalendar, TradingCalendar};
pub use types::bar::Bar;
pub use types::contract::{Contract, SecType};
pub use types::status::BarStatus;

/// Minimum wall-clock seconds between consecutive gateway requests.
pub const DEFAULT_RATE_LIMIT_SECS: u64 = 10;

/// One-minute bars in a regular 6h30 NYSE session.
pub const REGULAR_DAY_BARS: u32 = 390;

/// Accepted early-close session lengths, in one-minute bars.
pub const EARLY_CLOSE_BARS: [u32; 2] = [360, 210];

/// UTC hour of the regular exchange close, used when no calendar schedule
/// is available to supply the actual close.
pub const DEFAULT_MARKET_CLOSE_UTC_HOUR: u32 = 21;

/// Default per-date wall-clock guard around a single fetch, in seconds.
pub const DEFAULT_PER_DATE_TIMEOUT_SECS: u64 = 60;

/// Seconds a graceful stop is allowed before outstanding work is cancelled.
pub const FORCED_STOP_GRACE_SECS: u64 = 5;
