use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SIMULATIONS;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VarMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

/// Distribution Monte Carlo draws come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SimulationSource {
    /// Normal distribution fitted to the sample mean and standard deviation
    #[default]
    Normal,
    /// Resampling the observed returns with replacement
    Bootstrap,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonteCarloConfig {
    pub simulations: usize,
    /// Unseeded runs draw their master seed from the operating system.
    pub seed: Option<u64>,
    pub source: SimulationSource,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            seed: None,
            source: SimulationSource::default(),
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<()> {
        if self.simulations < 2 {
            return Err(Error::invalid_parameter(
                "simulations",
                format!("at least 2 simulations are required, got {}", self.simulations),
            ));
        }
        Ok(())
    }
}

/// One VaR/CVaR estimate.
///
/// `var` and `cvar` are return thresholds: a negative number is a loss. `cvar <= var`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarEstimate {
    pub method: VarMethod,
    pub confidence: f64,
    pub var: f64,
    pub cvar: f64,
    pub observations: usize,
    pub simulations: Option<usize>,
}

impl VarEstimate {
    /// Loss at the VaR threshold (negative when even the tail is a gain).
    pub fn loss(&self) -> f64 {
        -self.var
    }

    /// Expected loss beyond the VaR threshold.
    pub fn expected_shortfall(&self) -> f64 {
        -self.cvar
    }
}

/// Realized breaches of the rolling historical VaR forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarBacktest {
    pub confidence: f64,
    pub window: usize,
    pub forecasts: usize,
    pub breaches: usize,
    pub breach_rate: f64,
    pub expected_rate: f64,
    pub breach_dates: Vec<NaiveDate>,
    /// Kupiec proportion-of-failures likelihood ratio
    pub kupiec_statistic: f64,
    /// Chi-square(1) p-value of the Kupiec statistic
    pub p_value: f64,
}

impl VarBacktest {
    /// True when the breach count is consistent with the nominal rate at `significance`.
    pub fn is_accepted(&self, significance: f64) -> bool {
        self.p_value >= significance
    }
}
