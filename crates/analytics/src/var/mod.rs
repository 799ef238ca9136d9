//! Value-at-Risk estimation and backtesting.

mod var_engine;
mod var_model;

pub use var_engine::*;
pub use var_model::*;
