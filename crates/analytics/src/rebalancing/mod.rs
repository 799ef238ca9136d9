//! Rebalancing advice: drift against target weights, trade lists and whole-share
//! allocation.

mod discrete_allocation;
mod rebalancing_advisor;
mod rebalancing_model;

pub use discrete_allocation::*;
pub use rebalancing_advisor::*;
pub use rebalancing_model::*;
