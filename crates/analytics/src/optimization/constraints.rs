//! Portfolio weight constraints.
//!
//! `Constraints` is the inbound request shape. It is resolved once against an asset
//! universe into `ResolvedConstraints`, which is where every bound, sector and turnover
//! problem is reported; the solver never sees an unvalidated constraint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Slack allowed when checking that bounds can sum to one.
const BOUND_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorConstraint {
    pub sector: String,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub min_weight: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

/// Maximum turnover `sum(|w - reference|)` relative to a reference allocation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnoverConstraint {
    pub reference: BTreeMap<String, f64>,
    pub max_turnover: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    /// Applies to every asset without its own bounds. A negative minimum allows shorting.
    pub min_weight: f64,
    pub max_weight: f64,
    pub asset_bounds: BTreeMap<String, WeightBounds>,
    pub sectors: Vec<SectorConstraint>,
    pub turnover: Option<TurnoverConstraint>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            min_weight: 0.0,
            max_weight: default_max_weight(),
            asset_bounds: BTreeMap::new(),
            sectors: Vec::new(),
            turnover: None,
        }
    }
}

fn default_max_weight() -> f64 {
    1.0
}

impl Constraints {
    /// Long-only with the given global bounds.
    pub fn long_only(min_weight: f64, max_weight: f64) -> Self {
        Self {
            min_weight,
            max_weight,
            ..Self::default()
        }
    }

    pub fn with_asset_bounds(mut self, symbol: impl Into<String>, min: f64, max: f64) -> Self {
        self.asset_bounds
            .insert(symbol.into(), WeightBounds { min, max });
        self
    }

    pub fn with_sector(mut self, sector: SectorConstraint) -> Self {
        self.sectors.push(sector);
        self
    }

    pub fn with_turnover(mut self, reference: BTreeMap<String, f64>, max_turnover: f64) -> Self {
        self.turnover = Some(TurnoverConstraint {
            reference,
            max_turnover,
        });
        self
    }

    /// Validates against `symbols` and produces index-based bounds.
    pub fn resolve(&self, symbols: &[String]) -> Result<ResolvedConstraints> {
        check_bounds("global", self.min_weight, self.max_weight)?;

        for symbol in self.asset_bounds.keys() {
            if !symbols.contains(symbol) {
                return Err(Error::invalid_parameter(
                    "assetBounds",
                    format!("{} is not in the asset universe", symbol),
                ));
            }
        }

        let mut lower = Vec::with_capacity(symbols.len());
        let mut upper = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let (lo, hi) = match self.asset_bounds.get(symbol) {
                Some(b) => {
                    check_bounds(symbol, b.min, b.max)?;
                    (b.min, b.max)
                }
                None => (self.min_weight, self.max_weight),
            };
            lower.push(lo);
            upper.push(hi);
        }

        let min_sum: f64 = lower.iter().sum();
        let max_sum: f64 = upper.iter().sum();
        if min_sum > 1.0 + BOUND_SUM_TOLERANCE {
            return Err(Error::infeasible(format!(
                "minimum weights sum to {:.6}, above 1",
                min_sum
            )));
        }
        if max_sum < 1.0 - BOUND_SUM_TOLERANCE {
            return Err(Error::infeasible(format!(
                "maximum weights sum to {:.6}, below 1",
                max_sum
            )));
        }

        let sectors = self
            .sectors
            .iter()
            .map(|s| resolve_sector(s, symbols, &lower, &upper))
            .collect::<Result<Vec<_>>>()?;

        let turnover = match &self.turnover {
            Some(t) => Some(resolve_turnover(t, symbols)?),
            None => None,
        };

        Ok(ResolvedConstraints {
            lower,
            upper,
            sectors,
            turnover,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSector {
    pub name: String,
    pub members: Vec<usize>,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTurnover {
    pub reference: Vec<f64>,
    pub max_turnover: f64,
}

/// Index-aligned constraints, validated and mutually satisfiable as far as simple bound
/// arithmetic can tell.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub sectors: Vec<ResolvedSector>,
    pub turnover: Option<ResolvedTurnover>,
}

impl ResolvedConstraints {
    pub fn n_assets(&self) -> usize {
        self.lower.len()
    }
}

fn check_bounds(scope: &str, min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() {
        return Err(Error::invalid_parameter(
            "weightBounds",
            format!("{}: bounds must be finite", scope),
        ));
    }
    if min > max {
        return Err(Error::invalid_parameter(
            "weightBounds",
            format!("{}: min weight {} exceeds max weight {}", scope, min, max),
        ));
    }
    Ok(())
}

fn resolve_sector(
    sector: &SectorConstraint,
    symbols: &[String],
    lower: &[f64],
    upper: &[f64],
) -> Result<ResolvedSector> {
    check_bounds(&sector.sector, sector.min_weight, sector.max_weight)?;
    if sector.symbols.is_empty() {
        return Err(Error::invalid_parameter(
            "sectors",
            format!("sector {} has no members", sector.sector),
        ));
    }
    let members = sector
        .symbols
        .iter()
        .map(|s| {
            symbols.iter().position(|u| u == s).ok_or_else(|| {
                Error::invalid_parameter(
                    "sectors",
                    format!("{} in sector {} is not in the asset universe", s, sector.sector),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let reachable_min: f64 = members.iter().map(|&i| lower[i]).sum();
    let reachable_max: f64 = members.iter().map(|&i| upper[i]).sum();
    if sector.min_weight > reachable_max + BOUND_SUM_TOLERANCE
        || sector.max_weight < reachable_min - BOUND_SUM_TOLERANCE
    {
        return Err(Error::infeasible(format!(
            "sector {} bounds [{}, {}] cannot be met by member bounds [{}, {}]",
            sector.sector, sector.min_weight, sector.max_weight, reachable_min, reachable_max
        )));
    }

    Ok(ResolvedSector {
        name: sector.sector.clone(),
        members,
        min: sector.min_weight,
        max: sector.max_weight,
    })
}

fn resolve_turnover(turnover: &TurnoverConstraint, symbols: &[String]) -> Result<ResolvedTurnover> {
    if !turnover.max_turnover.is_finite() || turnover.max_turnover < 0.0 {
        return Err(Error::invalid_parameter(
            "maxTurnover",
            format!("must be non-negative, got {}", turnover.max_turnover),
        ));
    }
    for (symbol, weight) in &turnover.reference {
        if !symbols.contains(symbol) {
            return Err(Error::invalid_parameter(
                "turnover",
                format!("reference symbol {} is not in the asset universe", symbol),
            ));
        }
        if !weight.is_finite() {
            return Err(Error::invalid_parameter(
                "turnover",
                format!("reference weight of {} is not finite", symbol),
            ));
        }
    }
    Ok(ResolvedTurnover {
        reference: symbols
            .iter()
            .map(|s| turnover.reference.get(s).copied().unwrap_or(0.0))
            .collect(),
        max_turnover: turnover.max_turnover,
    })
}
