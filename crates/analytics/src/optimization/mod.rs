//! Mean-variance optimization: estimation, constraints, the QP solver, objectives and
//! the efficient frontier.

mod constraints;
mod estimation;
mod frontier;
mod optimization_model;
mod optimizer;
mod qp_solver;

pub use constraints::*;
pub use optimization_model::*;
pub use optimizer::{MeanVarianceOptimizer, PortfolioStatistics};
pub use qp_solver::*;
