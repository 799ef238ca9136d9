//! Engine configuration.
//!
//! One `AnalyticsConfig` carries every tunable used by the components: annualization,
//! risk-free rate, windows, confidence levels, Monte Carlo and solver settings. It is
//! passed explicitly into each component; nothing is read from global state.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DRAWDOWN_THRESHOLD, DEFAULT_FRONTIER_POINTS, DEFAULT_RISK_FREE_RATE,
    DEFAULT_ROLLING_WINDOW, SMALL_SAMPLE_WARNING, TRADING_DAYS_PER_YEAR,
};
use crate::errors::{Error, Result};
use crate::optimization::{ExpectedReturnMethod, SolverSettings};
use crate::rebalancing::RebalancePolicy;
use crate::returns::{MissingDataPolicy, ReturnKind};
use crate::var::MonteCarloConfig;

/// Configuration shared by all analytics components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsConfig {
    /// Periods per year used for annualization (default: 252)
    pub periods_per_year: u32,

    /// Annual risk-free rate (default: 0.02)
    pub risk_free_rate: f64,

    /// Rolling window length in periods (default: 252)
    pub rolling_window: usize,

    /// Drawdown below which a period is flagged underwater (default: -0.05)
    pub drawdown_threshold: f64,

    /// Confidence levels reported in VaR tables (default: 0.95 and 0.99)
    pub confidence_levels: Vec<f64>,

    /// Sample size under which historical VaR warns (default: 30)
    pub min_var_observations: usize,

    /// How prices are turned into returns
    pub return_kind: ReturnKind,

    /// How dates missing from one asset but present in another are handled
    pub missing_data: MissingDataPolicy,

    pub monte_carlo: MonteCarloConfig,

    pub solver: SolverSettings,

    /// Number of efficient frontier points (default: 100)
    pub frontier_points: usize,

    /// Expected-return estimator used when building an asset universe from returns
    pub expected_returns: ExpectedReturnMethod,

    /// Shrinkage intensity toward a scaled identity. `None` never regularizes.
    pub covariance_shrinkage: Option<f64>,

    pub rebalancing: RebalancePolicy,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            drawdown_threshold: DEFAULT_DRAWDOWN_THRESHOLD,
            confidence_levels: vec![0.95, 0.99],
            min_var_observations: SMALL_SAMPLE_WARNING,
            return_kind: ReturnKind::default(),
            missing_data: MissingDataPolicy::default(),
            monte_carlo: MonteCarloConfig::default(),
            solver: SolverSettings::default(),
            frontier_points: DEFAULT_FRONTIER_POINTS,
            expected_returns: ExpectedReturnMethod::default(),
            covariance_shrinkage: None,
            rebalancing: RebalancePolicy::default(),
        }
    }
}

impl AnalyticsConfig {
    /// Parses a JSON document; absent keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalyticsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with a different risk-free rate.
    pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    /// Returns a copy with a different rolling window.
    pub fn with_rolling_window(mut self, window: usize) -> Self {
        self.rolling_window = window;
        self
    }

    /// Returns a copy with a fixed Monte Carlo seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.monte_carlo.seed = Some(seed);
        self
    }

    /// Risk-free rate per period (simple de-annualization).
    pub fn per_period_risk_free(&self) -> f64 {
        self.risk_free_rate / f64::from(self.periods_per_year)
    }

    pub fn validate(&self) -> Result<()> {
        if self.periods_per_year == 0 {
            return Err(Error::invalid_parameter(
                "periodsPerYear",
                "must be greater than zero",
            ));
        }
        if !self.risk_free_rate.is_finite() || self.risk_free_rate <= -1.0 {
            return Err(Error::invalid_parameter(
                "riskFreeRate",
                format!("{} is not a valid annual rate", self.risk_free_rate),
            ));
        }
        if self.rolling_window < 2 {
            return Err(Error::invalid_parameter(
                "rollingWindow",
                format!("must be at least 2, got {}", self.rolling_window),
            ));
        }
        if !(-1.0..=0.0).contains(&self.drawdown_threshold) {
            return Err(Error::invalid_parameter(
                "drawdownThreshold",
                format!("must be in [-1, 0], got {}", self.drawdown_threshold),
            ));
        }
        if self.confidence_levels.is_empty() {
            return Err(Error::invalid_parameter(
                "confidenceLevels",
                "at least one confidence level is required",
            ));
        }
        for &level in &self.confidence_levels {
            validate_confidence(level)?;
        }
        if self.frontier_points < 2 {
            return Err(Error::invalid_parameter(
                "frontierPoints",
                format!("must be at least 2, got {}", self.frontier_points),
            ));
        }
        if let Some(shrinkage) = self.covariance_shrinkage {
            if !(0.0..=1.0).contains(&shrinkage) {
                return Err(Error::invalid_parameter(
                    "covarianceShrinkage",
                    format!("must be in [0, 1], got {}", shrinkage),
                ));
            }
        }
        self.monte_carlo.validate()?;
        self.solver.validate()?;
        Ok(())
    }
}

/// Confidence levels must lie strictly between 0 and 1.
pub fn validate_confidence(confidence: f64) -> Result<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(Error::invalid_parameter(
            "confidence",
            format!("must be in (0, 1), got {}", confidence),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalyticsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.periods_per_year, 252);
        assert_eq!(config.rolling_window, 252);
        assert_eq!(config.confidence_levels, vec![0.95, 0.99]);
        assert!(config.covariance_shrinkage.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            AnalyticsConfig::from_json(r#"{ "riskFreeRate": 0.0, "rollingWindow": 63 }"#).unwrap();
        assert_eq!(config.risk_free_rate, 0.0);
        assert_eq!(config.rolling_window, 63);
        assert_eq!(config.periods_per_year, 252);
        assert_eq!(config.frontier_points, 100);
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let result = AnalyticsConfig::from_json(r#"{ "confidenceLevels": [0.95, 1.0] }"#);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = AnalyticsConfig::from_json("{ not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_per_period_risk_free() {
        let config = AnalyticsConfig::default().with_risk_free_rate(0.0252);
        assert!((config.per_period_risk_free() - 0.0001).abs() < 1e-15);
    }
}
