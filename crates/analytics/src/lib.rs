//! Folio Analytics - Portfolio risk, optimization and simulation engine.
//!
//! Turns price histories into return series and computes risk metrics, Value-at-Risk,
//! mean-variance optimal portfolios, rebalancing trades, stress scenarios and backtests.
//! Data access goes through the repository traits in `service`.

pub mod backtest;
pub mod config;
pub mod constants;
pub mod errors;
pub mod metrics;
pub mod optimization;
pub mod rebalancing;
pub mod returns;
pub mod scenario;
pub mod service;
pub mod utils;
pub mod var;

pub use config::AnalyticsConfig;
pub use service::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
