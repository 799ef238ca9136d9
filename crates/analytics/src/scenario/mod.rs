//! Stress testing by return, volatility and correlation shocks.

mod scenario_engine;
mod scenario_model;

pub use scenario_engine::*;
pub use scenario_model::*;
