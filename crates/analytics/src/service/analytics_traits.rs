//! Collaborator and service contracts.

use chrono::NaiveDate;

use super::analytics_model::{
    BacktestRequest, FrontierRequest, OptimizationRequest, RebalancingRequest, RiskReportRequest,
    ScenarioRequest,
};
use crate::backtest::BacktestResult;
use crate::errors::Result;
use crate::metrics::RiskReport;
use crate::optimization::{EfficientFrontier, OptimizedPortfolio};
use crate::rebalancing::{Holding, RebalancingPlan};
use crate::returns::PriceHistory;
use crate::scenario::ScenarioAnalysis;

/// Source of historical closing prices.
pub trait PriceHistoryRepositoryTrait: Send + Sync {
    /// Price histories for `symbols`, restricted to `[start, end]` when given.
    ///
    /// Symbols without data are left out of the result rather than failing the call.
    fn get_price_history(
        &self,
        symbols: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceHistory>>;
}

/// Source of the current holdings snapshot of a portfolio.
pub trait HoldingsRepositoryTrait: Send + Sync {
    fn get_holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>>;
}

/// Trait defining the contract for analytics operations.
pub trait AnalyticsServiceTrait: Send + Sync {
    /// Comprehensive risk metrics of a portfolio held at its current weights, scored
    /// into a risk level with recommendations.
    fn get_risk_report(&self, request: &RiskReportRequest) -> Result<RiskReport>;

    fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizedPortfolio>;

    fn get_efficient_frontier(&self, request: &FrontierRequest) -> Result<EfficientFrontier>;

    fn get_rebalancing_plan(&self, request: &RebalancingRequest) -> Result<RebalancingPlan>;

    fn run_scenarios(&self, request: &ScenarioRequest) -> Result<ScenarioAnalysis>;

    fn run_backtest(&self, request: &BacktestRequest) -> Result<BacktestResult>;
}
