//! Whole-share allocation of cash to target weights.

use std::collections::BTreeMap;

use log::debug;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;

use crate::constants::DECIMAL_PRECISION;
use crate::errors::{Error, Result};

use super::rebalancing_model::DiscreteAllocation;

/// Greedy whole-share allocation.
///
/// The first pass buys the whole shares each weight affords, largest weight first. The
/// second pass spends the leftover one share at a time on the affordable asset furthest
/// below its target weight, until no share fits.
pub fn allocate_whole_shares(
    weights: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, Decimal>,
    cash: Decimal,
) -> Result<DiscreteAllocation> {
    if cash < Decimal::ZERO {
        return Err(Error::invalid_parameter("cash", "must not be negative"));
    }

    let mut targets: Vec<(String, Decimal, Decimal)> = Vec::new();
    for (symbol, weight) in weights {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::invalid_parameter(
                "weights",
                format!("weight of {} must be non-negative, got {}", symbol, weight),
            ));
        }
        if *weight == 0.0 {
            continue;
        }
        let weight = Decimal::from_f64(*weight)
            .map(|w| w.round_dp(DECIMAL_PRECISION))
            .ok_or_else(|| {
                Error::invalid_parameter("weights", format!("{} is not representable", weight))
            })?;
        let price = match prices.get(symbol) {
            Some(p) if *p > Decimal::ZERO => *p,
            _ => {
                return Err(Error::invalid_parameter(
                    "prices",
                    format!("no positive price for {}", symbol),
                ))
            }
        };
        targets.push((symbol.clone(), weight, price));
    }
    targets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut shares: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut leftover = cash;
    for (symbol, weight, price) in &targets {
        let count = (weight * cash / price).floor();
        let cost = count * price;
        if count > Decimal::ZERO && cost <= leftover {
            leftover -= cost;
            shares.insert(symbol.clone(), count);
        }
    }

    loop {
        let candidate = targets
            .iter()
            .filter(|(_, _, price)| *price <= leftover)
            .map(|(symbol, weight, price)| {
                let held = shares.get(symbol).copied().unwrap_or(Decimal::ZERO);
                let current = if cash.is_zero() {
                    Decimal::ZERO
                } else {
                    held * price / cash
                };
                (symbol, *weight - current, *price)
            })
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)));
        let Some((symbol, _, price)) = candidate else {
            break;
        };
        *shares.entry(symbol.clone()).or_insert(Decimal::ZERO) += Decimal::ONE;
        leftover -= price;
    }

    let invested = cash - leftover;
    debug!(
        "Allocated {} of {} across {} positions",
        invested,
        cash,
        shares.len()
    );
    Ok(DiscreteAllocation {
        shares,
        invested,
        leftover_cash: leftover,
    })
}
