//! Replays a target allocation over historical returns.

mod backtest_model;
mod backtester;

pub use backtest_model::*;
pub use backtester::*;
