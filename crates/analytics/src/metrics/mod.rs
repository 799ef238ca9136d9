//! Risk and performance statistics.

mod benchmark;
mod correlation;
mod metrics_calculator;
mod metrics_model;
mod report;

pub use correlation::*;
pub use metrics_calculator::*;
pub use metrics_model::*;
pub use report::*;
