//! Historical replay of a target allocation.

use std::collections::BTreeMap;

use log::debug;

use super::backtest_model::{
    BacktestConfig, BacktestResult, RebalanceEvent, ValuePoint,
};
use crate::config::AnalyticsConfig;
use crate::constants::{MIN_OBSERVATIONS, TARGET_WEIGHT_SUM_TOLERANCE};
use crate::errors::{Error, Result};
use crate::metrics::RiskMetricsCalculator;
use crate::optimization::OptimizedPortfolio;
use crate::returns::{ReturnKind, ReturnMatrix, ReturnSeries};
use crate::utils::time_utils::is_period_end;

#[derive(Debug, Clone)]
pub struct Backtester {
    config: AnalyticsConfig,
}

impl Backtester {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Replays `targets` over `returns`.
    ///
    /// Holdings drift with their assets' returns. At the last observation of each
    /// rebalancing period (never the final observation) they are traded back to target
    /// and `transaction_cost_rate` times the traded value is deducted. Buying the initial
    /// allocation is free.
    pub fn run(
        &self,
        returns: &ReturnMatrix,
        targets: &BTreeMap<String, f64>,
        settings: &BacktestConfig,
    ) -> Result<BacktestResult> {
        validate_settings(settings)?;
        let window = returns.between(settings.start_date, settings.end_date);
        if window.n_periods() < MIN_OBSERVATIONS {
            return Err(Error::insufficient_data(
                "backtest",
                MIN_OBSERVATIONS,
                window.n_periods(),
            ));
        }
        let weights = target_vector(&window, targets)?;
        let columns: Vec<Vec<f64>> = (0..window.n_assets())
            .map(|i| window.simple_column(i))
            .collect();
        let dates = window.dates();
        let period = settings.frequency.calendar_period();

        let mut holdings: Vec<f64> = weights.iter().map(|w| w * settings.initial_value).collect();
        let mut previous_value = settings.initial_value;
        let mut value_path = Vec::with_capacity(dates.len());
        let mut period_returns = Vec::with_capacity(dates.len());
        let mut rebalances = Vec::new();
        let mut total_costs = 0.0;
        let mut total_turnover = 0.0;

        for (t, &date) in dates.iter().enumerate() {
            for (holding, column) in holdings.iter_mut().zip(&columns) {
                *holding *= 1.0 + column[t];
            }
            let mut value: f64 = holdings.iter().sum();

            let next = dates.get(t + 1).copied();
            if let Some(period) = period {
                if value > 0.0 && is_period_end(date, next, period) {
                    let traded: f64 = holdings
                        .iter()
                        .zip(&weights)
                        .map(|(h, w)| (w * value - h).abs())
                        .sum();
                    let cost = settings.transaction_cost_rate * traded;
                    let after = value - cost;
                    let turnover = traded / value;
                    debug!(
                        "Rebalancing on {}: turnover {:.4}, cost {:.2}",
                        date, turnover, cost
                    );
                    rebalances.push(RebalanceEvent {
                        date,
                        turnover,
                        cost,
                        value_before: value,
                        value_after: after,
                    });
                    total_costs += cost;
                    total_turnover += turnover;
                    holdings = weights.iter().map(|w| w * after).collect();
                    value = after;
                }
            }

            let period_return = if previous_value > 0.0 {
                value / previous_value - 1.0
            } else {
                0.0
            };
            period_returns.push(period_return);
            value_path.push(ValuePoint { date, value });
            previous_value = value;
        }

        let series = ReturnSeries::new(
            "backtest",
            ReturnKind::Simple,
            dates.to_vec(),
            period_returns,
        )?;
        let config = match settings.risk_free_rate {
            Some(rate) => self.config.clone().with_risk_free_rate(rate),
            None => self.config.clone(),
        };
        let summary = RiskMetricsCalculator::new(&config).calculate(&series, None)?;

        Ok(BacktestResult {
            start_date: dates[0],
            end_date: dates[dates.len() - 1],
            initial_value: settings.initial_value,
            final_value: previous_value,
            value_path,
            returns: series,
            summary,
            rebalances,
            total_costs,
            total_turnover,
        })
    }

    /// Replays the weights of an optimizer result.
    pub fn run_portfolio(
        &self,
        returns: &ReturnMatrix,
        portfolio: &OptimizedPortfolio,
        settings: &BacktestConfig,
    ) -> Result<BacktestResult> {
        self.run(returns, &portfolio.weights, settings)
    }
}

fn validate_settings(settings: &BacktestConfig) -> Result<()> {
    if !(settings.initial_value.is_finite() && settings.initial_value > 0.0) {
        return Err(Error::invalid_parameter(
            "initialValue",
            format!("must be positive, got {}", settings.initial_value),
        ));
    }
    if !(0.0..1.0).contains(&settings.transaction_cost_rate) {
        return Err(Error::invalid_parameter(
            "transactionCostRate",
            format!("must be in [0, 1), got {}", settings.transaction_cost_rate),
        ));
    }
    if let (Some(start), Some(end)) = (settings.start_date, settings.end_date) {
        if start > end {
            return Err(Error::invalid_parameter(
                "startDate",
                format!("{} is after end date {}", start, end),
            ));
        }
    }
    Ok(())
}

fn target_vector(returns: &ReturnMatrix, targets: &BTreeMap<String, f64>) -> Result<Vec<f64>> {
    for (symbol, weight) in targets {
        if returns.index_of(symbol).is_none() {
            return Err(Error::invalid_parameter(
                "targets",
                format!("{} has no return history", symbol),
            ));
        }
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::invalid_parameter(
                "targets",
                format!("weight of {} must be non-negative, got {}", symbol, weight),
            ));
        }
    }
    let weights: Vec<f64> = returns
        .symbols()
        .iter()
        .map(|s| targets.get(s).copied().unwrap_or(0.0))
        .collect();
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > TARGET_WEIGHT_SUM_TOLERANCE {
        return Err(Error::invalid_parameter(
            "targets",
            format!("weights sum to {:.6}, expected 1", sum),
        ));
    }
    Ok(weights)
}
