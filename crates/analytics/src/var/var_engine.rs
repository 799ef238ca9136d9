use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, Continuous, ContinuousCDF, Normal as StandardNormal};

use super::var_model::{MonteCarloConfig, SimulationSource, VarBacktest, VarEstimate, VarMethod};
use crate::config::{validate_confidence, AnalyticsConfig};
use crate::constants::{MIN_OBSERVATIONS, SIMULATION_CHUNK_SIZE};
use crate::errors::{Error, Result};
use crate::returns::ReturnSeries;
use crate::utils::stats;

/// Value-at-Risk by historical, parametric and Monte Carlo methods.
#[derive(Debug, Clone)]
pub struct VarEngine {
    confidence_levels: Vec<f64>,
    min_observations: usize,
    monte_carlo: MonteCarloConfig,
}

impl VarEngine {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            confidence_levels: config.confidence_levels.clone(),
            min_observations: config.min_var_observations,
            monte_carlo: config.monte_carlo.clone(),
        }
    }

    /// Returns an engine that uses `monte_carlo` for simulations.
    pub fn with_monte_carlo(mut self, monte_carlo: MonteCarloConfig) -> Self {
        self.monte_carlo = monte_carlo;
        self
    }

    pub fn estimate(
        &self,
        series: &ReturnSeries,
        method: VarMethod,
        confidence: f64,
    ) -> Result<VarEstimate> {
        validate_confidence(confidence)?;
        if series.len() < MIN_OBSERVATIONS {
            return Err(Error::insufficient_data(
                "value at risk",
                MIN_OBSERVATIONS,
                series.len(),
            ));
        }
        let values = series.simple_values();
        match method {
            VarMethod::Historical => Ok(self.historical(&values, confidence)),
            VarMethod::Parametric => parametric(&values, confidence),
            VarMethod::MonteCarlo => self.monte_carlo(&values, confidence),
        }
    }

    /// Historical and parametric estimates at every configured confidence level, plus
    /// Monte Carlo at the first one.
    pub fn var_table(&self, series: &ReturnSeries) -> Result<Vec<VarEstimate>> {
        let mut table = Vec::with_capacity(self.confidence_levels.len() * 2 + 1);
        for &confidence in &self.confidence_levels {
            table.push(self.estimate(series, VarMethod::Historical, confidence)?);
            table.push(self.estimate(series, VarMethod::Parametric, confidence)?);
        }
        if let Some(&first) = self.confidence_levels.first() {
            table.push(self.estimate(series, VarMethod::MonteCarlo, first)?);
        }
        Ok(table)
    }

    fn historical(&self, values: &[f64], confidence: f64) -> VarEstimate {
        if values.len() < self.min_observations {
            warn!(
                "Historical VaR on {} observations (fewer than {}); the tail estimate is coarse",
                values.len(),
                self.min_observations
            );
        }
        let (var, cvar) = historical_var(values, confidence);
        VarEstimate {
            method: VarMethod::Historical,
            confidence,
            var,
            cvar,
            observations: values.len(),
            simulations: None,
        }
    }

    fn monte_carlo(&self, values: &[f64], confidence: f64) -> Result<VarEstimate> {
        self.monte_carlo.validate()?;
        let simulated = self.simulate(values)?;
        let (var, cvar) = historical_var(&simulated, confidence);
        Ok(VarEstimate {
            method: VarMethod::MonteCarlo,
            confidence,
            var,
            cvar,
            observations: values.len(),
            simulations: Some(simulated.len()),
        })
    }

    /// Draws the configured number of returns.
    ///
    /// Draws are produced in fixed-size chunks, each seeded from the master seed and its
    /// chunk index, so a seeded run gives the same draws for any thread count.
    fn simulate(&self, values: &[f64]) -> Result<Vec<f64>> {
        let total = self.monte_carlo.simulations;
        let master_seed = self
            .monte_carlo
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen());
        let mean = stats::mean(values);
        let std = stats::std_dev(values, 1);
        let normal = if std > 0.0 {
            Some(Normal::new(mean, std).map_err(|e| {
                Error::invalid_parameter("monteCarlo", format!("cannot fit normal: {}", e))
            })?)
        } else {
            None
        };
        let source = self.monte_carlo.source;
        let chunks = total.div_ceil(SIMULATION_CHUNK_SIZE);
        debug!(
            "Simulating {} returns in {} chunks ({:?})",
            total, chunks, source
        );

        let draws: Vec<Vec<f64>> = (0..chunks)
            .into_par_iter()
            .map(|chunk| {
                let size = SIMULATION_CHUNK_SIZE.min(total - chunk * SIMULATION_CHUNK_SIZE);
                let mut rng = StdRng::seed_from_u64(chunk_seed(master_seed, chunk));
                match (source, normal) {
                    (SimulationSource::Normal, Some(dist)) => {
                        (0..size).map(|_| dist.sample(&mut rng)).collect()
                    }
                    (SimulationSource::Normal, None) => vec![mean; size],
                    (SimulationSource::Bootstrap, _) => (0..size)
                        .map(|_| values[rng.gen_range(0..values.len())])
                        .collect(),
                }
            })
            .collect();
        Ok(draws.concat())
    }

    /// Compares each realized return to the historical VaR of the preceding `window`
    /// returns and tests the breach count with Kupiec's proportion-of-failures test.
    pub fn backtest(
        &self,
        series: &ReturnSeries,
        confidence: f64,
        window: usize,
    ) -> Result<VarBacktest> {
        validate_confidence(confidence)?;
        if window < MIN_OBSERVATIONS {
            return Err(Error::invalid_parameter(
                "window",
                format!("must be at least {}, got {}", MIN_OBSERVATIONS, window),
            ));
        }
        if series.len() <= window {
            return Err(Error::insufficient_data(
                "VaR backtest",
                window + 1,
                series.len(),
            ));
        }
        let values = series.simple_values();
        let mut breach_dates = Vec::new();
        for t in window..values.len() {
            let (var, _) = historical_var(&values[t - window..t], confidence);
            if values[t] < var {
                breach_dates.push(series.dates()[t]);
            }
        }

        let forecasts = values.len() - window;
        let breaches = breach_dates.len();
        let expected_rate = 1.0 - confidence;
        let kupiec_statistic = kupiec_statistic(forecasts, breaches, expected_rate);
        let chi_square = ChiSquared::new(1.0)
            .map_err(|e| Error::invalid_parameter("chiSquare", e.to_string()))?;
        let p_value = (1.0 - chi_square.cdf(kupiec_statistic)).clamp(0.0, 1.0);

        Ok(VarBacktest {
            confidence,
            window,
            forecasts,
            breaches,
            breach_rate: breaches as f64 / forecasts as f64,
            expected_rate,
            breach_dates,
            kupiec_statistic,
            p_value,
        })
    }
}

/// Empirical quantile at `1 - confidence` (linear interpolation) and the mean of the
/// returns at or below it.
pub fn historical_var(values: &[f64], confidence: f64) -> (f64, f64) {
    let sorted = stats::sorted_copy(values);
    let var = stats::quantile_sorted(&sorted, 1.0 - confidence);
    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= var).collect();
    let cvar = if tail.is_empty() {
        var
    } else {
        stats::mean(&tail)
    };
    (var, cvar)
}

/// Normal VaR `mean + z * std` with the closed-form normal tail expectation as CVaR.
fn parametric(values: &[f64], confidence: f64) -> Result<VarEstimate> {
    let mean = stats::mean(values);
    let std = stats::std_dev(values, 1);
    let standard = StandardNormal::new(0.0, 1.0)
        .map_err(|e| Error::invalid_parameter("normal", e.to_string()))?;
    let tail = 1.0 - confidence;
    let z = standard.inverse_cdf(tail);
    Ok(VarEstimate {
        method: VarMethod::Parametric,
        confidence,
        var: mean + z * std,
        cvar: mean - std * standard.pdf(z) / tail,
        observations: values.len(),
        simulations: None,
    })
}

fn chunk_seed(master: u64, chunk: usize) -> u64 {
    master ^ (chunk as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn kupiec_statistic(forecasts: usize, breaches: usize, expected_rate: f64) -> f64 {
    let t = forecasts as f64;
    let x = breaches as f64;
    let log_likelihood = |p: f64| {
        let mut ll = 0.0;
        if t - x > 0.0 {
            ll += (t - x) * (1.0 - p).ln();
        }
        if x > 0.0 {
            ll += x * p.ln();
        }
        ll
    };
    let observed = x / t;
    (-2.0 * (log_likelihood(expected_rate) - log_likelihood(observed))).max(0.0)
}
