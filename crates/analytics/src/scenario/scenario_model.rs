use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::RiskMetrics;
use crate::var::VarEstimate;

/// Adds `value` to every return of the targeted assets (all assets when `assets` is
/// `None`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnShock {
    pub value: f64,
    #[serde(default)]
    pub assets: Option<Vec<String>>,
}

/// Scales deviations from each targeted asset's mean return by `multiplier`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilityShock {
    pub multiplier: f64,
    #[serde(default)]
    pub assets: Option<Vec<String>>,
}

/// A named stress test.
///
/// `correlation_shock` in `[-1, 1]` blends the correlation matrix toward all-ones
/// (positive) or the identity (negative). `horizon` restricts the scenario to the
/// trailing number of periods.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub return_shock: Option<ReturnShock>,
    #[serde(default)]
    pub volatility_shock: Option<VolatilityShock>,
    #[serde(default)]
    pub correlation_shock: Option<f64>,
    #[serde(default)]
    pub horizon: Option<usize>,
}

impl ScenarioDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            return_shock: None,
            volatility_shock: None,
            correlation_shock: None,
            horizon: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_return_shock(mut self, value: f64, assets: Option<Vec<String>>) -> Self {
        self.return_shock = Some(ReturnShock { value, assets });
        self
    }

    pub fn with_volatility_shock(mut self, multiplier: f64, assets: Option<Vec<String>>) -> Self {
        self.volatility_shock = Some(VolatilityShock { multiplier, assets });
        self
    }

    pub fn with_correlation_shock(mut self, factor: f64) -> Self {
        self.correlation_shock = Some(factor);
        self
    }

    pub fn with_horizon(mut self, periods: usize) -> Self {
        self.horizon = Some(periods);
        self
    }
}

/// Risk metrics and VaR table of one portfolio return series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioMetrics {
    pub metrics: RiskMetrics,
    pub value_at_risk: Vec<VarEstimate>,
}

/// Stressed minus unstressed values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioImpact {
    pub total_return_change: f64,
    pub annualized_return_change: f64,
    pub volatility_change: f64,
    pub sharpe_ratio_change: f64,
    pub max_drawdown_change: f64,
    /// Change of the historical VaR at the first configured confidence level
    pub var_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,
    pub description: Option<String>,
    pub periods: usize,
    pub stressed: ScenarioMetrics,
    /// Unshocked metrics over the same trailing window; present only with a horizon
    pub window_baseline: Option<ScenarioMetrics>,
    pub impact: ScenarioImpact,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioAnalysis {
    pub baseline: ScenarioMetrics,
    pub scenarios: BTreeMap<String, ScenarioResult>,
}
