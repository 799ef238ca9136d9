//! Drift detection and trade generation against target weights.
//!
//! Weights, dollar amounts and share counts are `Decimal`: applying a plan's weight
//! deltas to the weights it was computed from lands exactly on the targets, so a second
//! pass over the post-trade weights never flags drift.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use num_traits::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::constants::{DECIMAL_PRECISION, TARGET_WEIGHT_SUM_TOLERANCE};
use crate::errors::{Error, Result};

use super::rebalancing_model::{
    AssetDrift, Holding, RebalanceMode, RebalancePolicy, RebalancingPlan, ShareRounding,
    TradeAction, TradeRecommendation,
};

#[derive(Debug, Clone, Default)]
pub struct RebalancingAdvisor {
    policy: RebalancePolicy,
}

impl RebalancingAdvisor {
    pub fn new(policy: RebalancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RebalancePolicy {
        self.policy
    }

    /// Plans trades that move `holdings` toward `targets`.
    ///
    /// Assets held but missing from `targets` have a target of zero. A target without a
    /// holding needs its price supplied as a zero-quantity holding.
    pub fn plan(
        &self,
        holdings: &[Holding],
        targets: &BTreeMap<String, f64>,
        tolerance: f64,
    ) -> Result<RebalancingPlan> {
        let mut prices = BTreeMap::new();
        let mut values = BTreeMap::new();
        for holding in holdings {
            if holding.price <= Decimal::ZERO {
                return Err(Error::invalid_parameter(
                    "holdings",
                    format!("price of {} must be positive", holding.symbol),
                ));
            }
            if holding.quantity < Decimal::ZERO {
                return Err(Error::invalid_parameter(
                    "holdings",
                    format!("quantity of {} is negative", holding.symbol),
                ));
            }
            if prices.insert(holding.symbol.clone(), holding.price).is_some() {
                return Err(Error::invalid_parameter(
                    "holdings",
                    format!("{} appears more than once", holding.symbol),
                ));
            }
            values.insert(holding.symbol.clone(), holding.market_value());
        }

        let total_value: Decimal = values.values().copied().sum();
        if total_value <= Decimal::ZERO {
            return Err(Error::invalid_parameter(
                "holdings",
                "total portfolio value is zero",
            ));
        }
        let current: BTreeMap<String, Decimal> = values
            .into_iter()
            .map(|(symbol, value)| (symbol, value / total_value))
            .collect();

        self.plan_for_weights(&current, targets, tolerance, total_value, &prices)
    }

    /// Plans trades from weights directly; `prices` must cover every traded symbol.
    pub fn plan_for_weights(
        &self,
        current: &BTreeMap<String, Decimal>,
        targets: &BTreeMap<String, f64>,
        tolerance: f64,
        total_value: Decimal,
        prices: &BTreeMap<String, Decimal>,
    ) -> Result<RebalancingPlan> {
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(Error::invalid_parameter(
                "tolerance",
                format!("must be in [0, 1], got {}", tolerance),
            ));
        }
        if total_value <= Decimal::ZERO {
            return Err(Error::invalid_parameter(
                "totalValue",
                "total portfolio value is zero",
            ));
        }
        let targets = decimal_targets(targets)?;
        let tolerance_dec = to_decimal("tolerance", tolerance)?;

        let symbols: BTreeSet<&String> = current.keys().chain(targets.keys()).collect();
        let mut drift = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let current_weight = current.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let target_weight = targets.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let delta = current_weight - target_weight;
            drift.push(AssetDrift {
                symbol: symbol.clone(),
                current_weight,
                target_weight,
                drift: delta,
                exceeds_tolerance: delta.abs() > tolerance_dec,
            });
        }

        let rebalancing_needed = drift.iter().any(|d| d.exceeds_tolerance);
        let mut trades = Vec::new();
        if rebalancing_needed {
            for row in &drift {
                let trade = match self.policy.mode {
                    RebalanceMode::Partial => row.exceeds_tolerance,
                    RebalanceMode::Full => true,
                };
                if trade {
                    trades.push(self.recommend(row, total_value, prices)?);
                }
            }
        }
        let net_cash_flow = -trades.iter().map(|t| t.dollar_amount).sum::<Decimal>();

        debug!(
            "Rebalancing {}: {} drift rows, {} trades, net cash flow {}",
            if rebalancing_needed { "needed" } else { "not needed" },
            drift.len(),
            trades.len(),
            net_cash_flow
        );

        Ok(RebalancingPlan {
            rebalancing_needed,
            total_value,
            tolerance: tolerance_dec,
            policy: self.policy,
            drift,
            trades,
            net_cash_flow,
        })
    }

    fn recommend(
        &self,
        row: &AssetDrift,
        total_value: Decimal,
        prices: &BTreeMap<String, Decimal>,
    ) -> Result<TradeRecommendation> {
        let weight_delta = row.target_weight - row.current_weight;
        let price = match prices.get(&row.symbol) {
            Some(p) if *p > Decimal::ZERO => *p,
            _ => {
                return Err(Error::invalid_parameter(
                    "prices",
                    format!("no positive price for {}", row.symbol),
                ))
            }
        };
        let dollar_amount = (weight_delta * total_value).round_dp(DECIMAL_PRECISION);
        let raw_shares = dollar_amount / price;
        let shares = match self.policy.rounding {
            ShareRounding::TowardZero => raw_shares.trunc(),
            ShareRounding::Nearest => {
                raw_shares.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            }
            ShareRounding::Fractional => raw_shares.round_dp(DECIMAL_PRECISION),
        };
        let action = if weight_delta > Decimal::ZERO {
            TradeAction::Buy
        } else if weight_delta < Decimal::ZERO {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };
        Ok(TradeRecommendation {
            symbol: row.symbol.clone(),
            action,
            current_weight: row.current_weight,
            target_weight: row.target_weight,
            weight_delta,
            dollar_amount,
            shares,
            price,
        })
    }

    /// Weights after executing `trades` exactly at their weight deltas.
    pub fn apply_trades(
        current: &BTreeMap<String, Decimal>,
        trades: &[TradeRecommendation],
    ) -> BTreeMap<String, Decimal> {
        let mut weights = current.clone();
        for trade in trades {
            *weights.entry(trade.symbol.clone()).or_insert(Decimal::ZERO) += trade.weight_delta;
        }
        weights.retain(|_, w| !w.is_zero());
        weights
    }

    /// Holdings after executing `trades` at their rounded share counts.
    pub fn apply_trades_to_holdings(
        holdings: &[Holding],
        trades: &[TradeRecommendation],
    ) -> Vec<Holding> {
        let mut positions: BTreeMap<String, Holding> = holdings
            .iter()
            .map(|h| (h.symbol.clone(), h.clone()))
            .collect();
        for trade in trades {
            let position = positions
                .entry(trade.symbol.clone())
                .or_insert_with(|| Holding::new(trade.symbol.clone(), Decimal::ZERO, trade.price));
            position.quantity += trade.shares;
        }
        positions.into_values().collect()
    }
}

fn to_decimal(name: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(DECIMAL_PRECISION))
        .ok_or_else(|| Error::invalid_parameter(name, format!("{} is not representable", value)))
}

/// Validates target weights and converts them at fixed precision.
fn decimal_targets(targets: &BTreeMap<String, f64>) -> Result<BTreeMap<String, Decimal>> {
    if targets.is_empty() {
        return Err(Error::invalid_parameter("targets", "no target weights given"));
    }
    let mut sum = 0.0;
    for (symbol, weight) in targets {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::invalid_parameter(
                "targets",
                format!("weight of {} must be non-negative, got {}", symbol, weight),
            ));
        }
        sum += weight;
    }
    if (sum - 1.0).abs() > TARGET_WEIGHT_SUM_TOLERANCE {
        return Err(Error::invalid_parameter(
            "targets",
            format!("weights sum to {:.6}, expected 1", sum),
        ));
    }
    targets
        .iter()
        .map(|(symbol, weight)| Ok((symbol.clone(), to_decimal("targets", *weight)?)))
        .collect()
}
