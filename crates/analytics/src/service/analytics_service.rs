//! Analytics service implementation.

use chrono::NaiveDate;
use log::info;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::analytics_model::{
    BacktestRequest, FrontierRequest, OptimizationRequest, RebalancingRequest, RiskReportRequest,
    ScenarioRequest,
};
use super::analytics_traits::{
    AnalyticsServiceTrait, HoldingsRepositoryTrait, PriceHistoryRepositoryTrait,
};
use crate::backtest::{BacktestResult, Backtester};
use crate::config::AnalyticsConfig;
use crate::errors::{Error, Result};
use crate::metrics::{HoldingsView, RiskAnalyzer, RiskReport};
use crate::optimization::{
    AssetUniverse, EfficientFrontier, EstimationSettings, MeanVarianceOptimizer,
    OptimizedPortfolio,
};
use crate::rebalancing::{Holding, RebalancingAdvisor, RebalancingPlan};
use crate::returns::{PriceHistory, ReturnMatrix, ReturnSeriesBuilder};
use crate::scenario::{ScenarioAnalysis, ScenarioEngine};

/// Facade wiring the analytics components to price and holdings data.
pub struct AnalyticsService {
    config: AnalyticsConfig,
    price_repository: Arc<dyn PriceHistoryRepositoryTrait>,
    holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
}

impl AnalyticsService {
    /// Creates a new AnalyticsService instance after validating `config`.
    pub fn new(
        config: AnalyticsConfig,
        price_repository: Arc<dyn PriceHistoryRepositoryTrait>,
        holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            price_repository,
            holdings_repository,
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Price histories for every symbol, in the order requested.
    fn load_histories(
        &self,
        symbols: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceHistory>> {
        let unique: BTreeSet<&String> = symbols.iter().collect();
        if unique.len() != symbols.len() {
            return Err(Error::invalid_parameter(
                "symbols",
                "symbols must be unique",
            ));
        }
        let mut by_symbol: BTreeMap<String, PriceHistory> = self
            .price_repository
            .get_price_history(symbols, start, end)?
            .into_iter()
            .map(|h| (h.symbol.clone(), h))
            .collect();
        symbols
            .iter()
            .map(|symbol| {
                by_symbol
                    .remove(symbol)
                    .ok_or_else(|| Error::Repository(format!("No price history for {}", symbol)))
            })
            .collect()
    }

    fn load_returns(
        &self,
        symbols: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ReturnMatrix> {
        if symbols.is_empty() {
            return Err(Error::invalid_parameter(
                "symbols",
                "at least one symbol is required",
            ));
        }
        let histories = self.load_histories(symbols, start, end)?;
        ReturnSeriesBuilder::from_config(&self.config).build_matrix(&histories)
    }

    fn load_universe(
        &self,
        symbols: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<AssetUniverse> {
        let returns = self.load_returns(symbols, start, end)?;
        AssetUniverse::from_returns(&returns, &EstimationSettings::from_config(&self.config))
    }

    fn load_holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        let holdings: Vec<Holding> = self
            .holdings_repository
            .get_holdings(portfolio_id)?
            .into_iter()
            .filter(|h| !h.quantity.is_zero())
            .collect();
        if holdings.is_empty() {
            return Err(Error::invalid_parameter(
                "portfolioId",
                format!("portfolio {} has no holdings", portfolio_id),
            ));
        }
        Ok(holdings)
    }

    fn optimizer(&self) -> MeanVarianceOptimizer {
        MeanVarianceOptimizer::new(&self.config)
    }
}

/// Market-value weights of `holdings`.
fn current_weights(holdings: &[Holding]) -> Result<BTreeMap<String, f64>> {
    let total: Decimal = holdings.iter().map(Holding::market_value).sum();
    if total <= Decimal::ZERO {
        return Err(Error::invalid_parameter(
            "holdings",
            "total portfolio value is zero",
        ));
    }
    holdings
        .iter()
        .map(|h| {
            let weight = (h.market_value() / total).to_f64().ok_or_else(|| {
                Error::invalid_parameter("holdings", format!("weight of {} overflows", h.symbol))
            })?;
            Ok((h.symbol.clone(), weight))
        })
        .collect()
}

fn weight_vector(symbols: &[String], weights: &BTreeMap<String, f64>) -> Vec<f64> {
    symbols
        .iter()
        .map(|s| weights.get(s).copied().unwrap_or(0.0))
        .collect()
}

impl AnalyticsServiceTrait for AnalyticsService {
    fn get_risk_report(&self, request: &RiskReportRequest) -> Result<RiskReport> {
        let holdings = self.load_holdings(&request.portfolio_id)?;
        let weights = current_weights(&holdings)?;
        let symbols: Vec<String> = weights.keys().cloned().collect();
        let returns = self.load_returns(&symbols, request.start_date, request.end_date)?;
        let vector = weight_vector(returns.symbols(), &weights);
        let portfolio = returns.portfolio_series(&request.portfolio_id, &vector)?;

        let benchmark = match &request.benchmark {
            Some(symbol) => {
                let histories = self.load_histories(
                    std::slice::from_ref(symbol),
                    request.start_date,
                    request.end_date,
                )?;
                Some(ReturnSeriesBuilder::from_config(&self.config).build_series(&histories[0])?)
            }
            None => None,
        };

        let view = HoldingsView {
            returns: &returns,
            weights: &vector,
        };
        let holdings_view = (request.include_correlation && returns.n_assets() > 1).then_some(view);

        info!(
            "Risk report for portfolio {} over {} periods",
            request.portfolio_id,
            portfolio.len()
        );
        RiskAnalyzer::new(&self.config).report(&portfolio, benchmark.as_ref(), holdings_view)
    }

    fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizedPortfolio> {
        let universe = self.load_universe(&request.symbols, request.start_date, request.end_date)?;
        self.optimizer()
            .optimize(&universe, &request.constraints, &request.objective)
    }

    fn get_efficient_frontier(&self, request: &FrontierRequest) -> Result<EfficientFrontier> {
        let universe = self.load_universe(&request.symbols, request.start_date, request.end_date)?;
        let reference = match &request.portfolio_id {
            Some(id) => Some(current_weights(&self.load_holdings(id)?)?),
            None => None,
        };
        self.optimizer()
            .efficient_frontier(&universe, &request.constraints, reference.as_ref())
    }

    fn get_rebalancing_plan(&self, request: &RebalancingRequest) -> Result<RebalancingPlan> {
        let mut holdings = self.load_holdings(&request.portfolio_id)?;

        // Targets not held yet are priced at their latest close.
        let held: BTreeSet<&str> = holdings.iter().map(|h| h.symbol.as_str()).collect();
        let missing: Vec<String> = request
            .targets
            .keys()
            .filter(|s| !held.contains(s.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            for history in self.load_histories(&missing, None, None)? {
                let latest = history.prices.last().ok_or_else(|| {
                    Error::Repository(format!("No price history for {}", history.symbol))
                })?;
                holdings.push(Holding::new(history.symbol.clone(), Decimal::ZERO, latest.close));
            }
        }

        RebalancingAdvisor::new(self.config.rebalancing).plan(
            &holdings,
            &request.targets,
            request.tolerance,
        )
    }

    fn run_scenarios(&self, request: &ScenarioRequest) -> Result<ScenarioAnalysis> {
        let weights = current_weights(&self.load_holdings(&request.portfolio_id)?)?;
        let symbols: Vec<String> = weights.keys().cloned().collect();
        let returns = self.load_returns(&symbols, request.start_date, request.end_date)?;
        ScenarioEngine::new(&self.config).run(&returns, &weights, &request.scenarios)
    }

    fn run_backtest(&self, request: &BacktestRequest) -> Result<BacktestResult> {
        let symbols: Vec<String> = request.targets.keys().cloned().collect();
        let returns = self.load_returns(
            &symbols,
            request.settings.start_date,
            request.settings.end_date,
        )?;
        Backtester::new(&self.config).run(&returns, &request.targets, &request.settings)
    }
}
