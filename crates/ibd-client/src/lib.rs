//! # ibd-client
//!
//! Gateway abstraction for the IBD bar archiver.
//!
//! The wire protocol to the market-data gateway is an external collaborator;
//! this crate owns the seam: the [`MarketDataClient`] trait every transport
//! implements, the [`RequestPacer`] that keeps outbound requests inside the
//! gateway's pacing rules, startup connection bootstrap, and the built-in
//! deterministic [`SimGateway`] transport used by dev/test configurations
//! and the test suite.

pub mod connection;
pub mod gateway;
pub mod rate_limit;
pub mod sim;

pub use connection::connect_with_backoff;
pub use gateway::{BarRequest, ContractResolver, MarketDataClient};
pub use rate_limit::RequestPacer;
pub use sim::SimGateway;
