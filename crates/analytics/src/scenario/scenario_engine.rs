//! Stress scenarios over historical returns.
//!
//! A scenario transforms a copy of the return matrix (correlation, then volatility,
//! then return shocks) and re-evaluates the fixed-weight portfolio on it. The input
//! matrix is never modified and scenarios never see each other's output.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rayon::prelude::*;

use super::scenario_model::{
    ScenarioAnalysis, ScenarioDefinition, ScenarioImpact, ScenarioMetrics, ScenarioResult,
};
use crate::config::AnalyticsConfig;
use crate::constants::{MIN_OBSERVATIONS, TARGET_WEIGHT_SUM_TOLERANCE};
use crate::errors::{Error, Result};
use crate::metrics::RiskMetricsCalculator;
use crate::returns::{ReturnMatrix, ReturnSeries};
use crate::var::{VarEngine, VarMethod};

/// Eigenvalues below this fraction of the largest are treated as zero when whitening.
const EIGENVALUE_CUTOFF: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    calculator: RiskMetricsCalculator,
    var_engine: VarEngine,
}

impl ScenarioEngine {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            calculator: RiskMetricsCalculator::new(config),
            var_engine: VarEngine::new(config),
        }
    }

    /// Runs every scenario independently against the portfolio held at `weights`.
    pub fn run(
        &self,
        returns: &ReturnMatrix,
        weights: &BTreeMap<String, f64>,
        scenarios: &[ScenarioDefinition],
    ) -> Result<ScenarioAnalysis> {
        let mut names = BTreeSet::new();
        for scenario in scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(Error::invalid_parameter(
                    "scenarios",
                    format!("duplicate scenario name {}", scenario.name),
                ));
            }
        }
        let weights = weight_vector(returns, weights)?;
        let baseline = self.evaluate(&returns.portfolio_series("baseline", &weights)?)?;

        let results = scenarios
            .par_iter()
            .map(|scenario| {
                self.run_one(returns, &weights, scenario, &baseline)
                    .map(|result| (scenario.name.clone(), result))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(ScenarioAnalysis {
            baseline,
            scenarios: results,
        })
    }

    fn run_one(
        &self,
        returns: &ReturnMatrix,
        weights: &[f64],
        scenario: &ScenarioDefinition,
        baseline: &ScenarioMetrics,
    ) -> Result<ScenarioResult> {
        let window = self.window(returns, scenario)?;
        let shocked = self.apply(&window, scenario)?;
        let stressed = self.evaluate(&shocked.portfolio_series(&scenario.name, weights)?)?;

        let window_baseline = match scenario.horizon {
            Some(_) => Some(self.evaluate(&window.portfolio_series("baseline", weights)?)?),
            None => None,
        };
        let reference = window_baseline.as_ref().unwrap_or(baseline);
        let impact = impact(reference, &stressed);
        debug!(
            "Scenario {}: annualized return change {:.4}, volatility change {:.4}",
            scenario.name, impact.annualized_return_change, impact.volatility_change
        );

        Ok(ScenarioResult {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            periods: window.n_periods(),
            stressed,
            window_baseline,
            impact,
        })
    }

    fn window(
        &self,
        returns: &ReturnMatrix,
        scenario: &ScenarioDefinition,
    ) -> Result<ReturnMatrix> {
        match scenario.horizon {
            None => Ok(returns.clone()),
            Some(h) if h < MIN_OBSERVATIONS => Err(Error::invalid_parameter(
                "horizon",
                format!("{}: at least {} periods are required", scenario.name, MIN_OBSERVATIONS),
            )),
            Some(h) if h > returns.n_periods() => Err(Error::insufficient_data(
                format!("scenario {} horizon", scenario.name),
                h,
                returns.n_periods(),
            )),
            Some(h) => Ok(returns.tail(h)),
        }
    }

    /// Shocked copy of `returns` as simple returns.
    pub fn apply(
        &self,
        returns: &ReturnMatrix,
        scenario: &ScenarioDefinition,
    ) -> Result<ReturnMatrix> {
        let mut data = returns.to_simple_dmatrix();

        if let Some(factor) = scenario.correlation_shock {
            if !(-1.0..=1.0).contains(&factor) {
                return Err(Error::invalid_parameter(
                    "correlationShock",
                    format!("{}: must be in [-1, 1], got {}", scenario.name, factor),
                ));
            }
            data = shift_correlation(&data, factor);
        }

        if let Some(shock) = &scenario.volatility_shock {
            if !(shock.multiplier.is_finite() && shock.multiplier >= 0.0) {
                return Err(Error::invalid_parameter(
                    "volatilityShock",
                    format!(
                        "{}: multiplier must be non-negative, got {}",
                        scenario.name, shock.multiplier
                    ),
                ));
            }
            for i in target_columns(returns, shock.assets.as_deref())? {
                let mut column = data.column_mut(i);
                let mean = column.mean();
                column.apply(|r| *r = mean + shock.multiplier * (*r - mean));
            }
        }

        if let Some(shock) = &scenario.return_shock {
            if !shock.value.is_finite() {
                return Err(Error::invalid_parameter(
                    "returnShock",
                    format!("{}: value must be finite", scenario.name),
                ));
            }
            for i in target_columns(returns, shock.assets.as_deref())? {
                data.column_mut(i).add_scalar_mut(shock.value);
            }
        }

        if let Some((t, i)) = (0..data.nrows())
            .flat_map(|t| (0..data.ncols()).map(move |i| (t, i)))
            .find(|&(t, i)| data[(t, i)] < -1.0)
        {
            return Err(Error::invalid_parameter(
                "scenario",
                format!(
                    "{} drives {} below -100% on {}",
                    scenario.name,
                    returns.symbols()[i],
                    returns.dates()[t]
                ),
            ));
        }

        returns.with_simple_dmatrix(&data)
    }

    fn evaluate(&self, series: &ReturnSeries) -> Result<ScenarioMetrics> {
        Ok(ScenarioMetrics {
            metrics: self.calculator.calculate(series, None)?,
            value_at_risk: self.var_engine.var_table(series)?,
        })
    }
}

fn weight_vector(returns: &ReturnMatrix, weights: &BTreeMap<String, f64>) -> Result<Vec<f64>> {
    for (symbol, weight) in weights {
        if returns.index_of(symbol).is_none() {
            return Err(Error::invalid_parameter(
                "weights",
                format!("{} has no return history", symbol),
            ));
        }
        if !weight.is_finite() {
            return Err(Error::invalid_parameter(
                "weights",
                format!("weight of {} is not finite", symbol),
            ));
        }
    }
    let vector: Vec<f64> = returns
        .symbols()
        .iter()
        .map(|s| weights.get(s).copied().unwrap_or(0.0))
        .collect();
    let sum: f64 = vector.iter().sum();
    if (sum - 1.0).abs() > TARGET_WEIGHT_SUM_TOLERANCE {
        return Err(Error::invalid_parameter(
            "weights",
            format!("weights sum to {:.6}, expected 1", sum),
        ));
    }
    Ok(vector)
}

fn target_columns(returns: &ReturnMatrix, assets: Option<&[String]>) -> Result<Vec<usize>> {
    match assets {
        None => Ok((0..returns.n_assets()).collect()),
        Some(symbols) => symbols
            .iter()
            .map(|s| {
                returns.index_of(s).ok_or_else(|| {
                    Error::invalid_parameter("assets", format!("{} has no return history", s))
                })
            })
            .collect(),
    }
}

/// Re-colors the centered returns so their sample correlation becomes the blended target,
/// keeping every asset's mean and variance.
fn shift_correlation(data: &DMatrix<f64>, factor: f64) -> DMatrix<f64> {
    let (t, n) = data.shape();
    if n < 2 || t < 2 || factor == 0.0 {
        return data.clone();
    }
    let means = DVector::from_fn(n, |i, _| data.column(i).mean());
    let mut centered = data.clone();
    for i in 0..n {
        centered.column_mut(i).add_scalar_mut(-means[i]);
    }
    let covariance = centered.transpose() * &centered / (t as f64 - 1.0);
    let std: Vec<f64> = (0..n).map(|i| covariance[(i, i)].max(0.0).sqrt()).collect();

    let mut target = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            if std[i] == 0.0 || std[j] == 0.0 {
                continue;
            }
            let rho = if i == j {
                1.0
            } else {
                covariance[(i, j)] / (std[i] * std[j])
            };
            let shifted = if factor > 0.0 {
                (1.0 - factor) * rho + factor
            } else {
                (1.0 + factor) * rho
            };
            target[(i, j)] = shifted * std[i] * std[j];
        }
    }

    let transform = symmetric_power(&covariance, -0.5) * symmetric_power(&target, 0.5);
    let mut shocked = centered * transform;
    for i in 0..n {
        shocked.column_mut(i).add_scalar_mut(means[i]);
    }
    shocked
}

/// `A^p` of a symmetric positive semi-definite matrix; negative powers invert only the
/// non-null eigenvalues.
fn symmetric_power(matrix: &DMatrix<f64>, power: f64) -> DMatrix<f64> {
    let eigen = SymmetricEigen::new(matrix.clone());
    let largest = eigen.eigenvalues.iter().copied().fold(0.0, f64::max);
    let cutoff = largest * EIGENVALUE_CUTOFF;
    let scaled = DVector::from_fn(eigen.eigenvalues.len(), |i, _| {
        let lambda = eigen.eigenvalues[i];
        if lambda <= cutoff {
            0.0
        } else {
            lambda.powf(power)
        }
    });
    &eigen.eigenvectors * DMatrix::from_diagonal(&scaled) * eigen.eigenvectors.transpose()
}

fn impact(baseline: &ScenarioMetrics, stressed: &ScenarioMetrics) -> ScenarioImpact {
    let base = &baseline.metrics;
    let shock = &stressed.metrics;
    ScenarioImpact {
        total_return_change: shock.total_return - base.total_return,
        annualized_return_change: shock.annualized_return - base.annualized_return,
        volatility_change: shock.annualized_volatility - base.annualized_volatility,
        sharpe_ratio_change: shock.sharpe_ratio - base.sharpe_ratio,
        max_drawdown_change: shock.max_drawdown - base.max_drawdown,
        var_change: historical_var(stressed) - historical_var(baseline),
    }
}

fn historical_var(metrics: &ScenarioMetrics) -> f64 {
    metrics
        .value_at_risk
        .iter()
        .find(|e| e.method == VarMethod::Historical)
        .map_or(0.0, |e| e.var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::stats;
    use crate::var::MonteCarloConfig;

    fn config() -> AnalyticsConfig {
        AnalyticsConfig::default()
            .with_risk_free_rate(0.0)
            .with_seed(11)
    }

    fn engine() -> ScenarioEngine {
        ScenarioEngine::new(&config())
    }

    fn matrix() -> ReturnMatrix {
        let a = vec![0.01, -0.02, 0.015, -0.01, 0.03, 0.004, -0.006, 0.012, -0.003, 0.007];
        let b = vec![0.002, 0.004, -0.001, 0.003, -0.002, 0.001, 0.0, 0.002, 0.003, -0.004];
        ReturnMatrix::from_series(&[
            ReturnSeries::from_values("A", a).unwrap(),
            ReturnSeries::from_values("B", b).unwrap(),
        ])
        .unwrap()
    }

    fn weights() -> BTreeMap<String, f64> {
        BTreeMap::from([("A".to_string(), 0.6), ("B".to_string(), 0.4)])
    }

    #[test]
    fn test_return_shock_on_subset() {
        let original = matrix();
        let scenario = ScenarioDefinition::new("crash")
            .with_return_shock(-0.01, Some(vec!["A".to_string()]));
        let shocked = engine().apply(&original, &scenario).unwrap();
        for t in 0..original.n_periods() {
            assert!((shocked.column(0)[t] - (original.column(0)[t] - 0.01)).abs() < 1e-15);
            assert_eq!(shocked.column(1)[t], original.column(1)[t]);
        }
    }

    #[test]
    fn test_volatility_shock_preserves_mean() {
        let original = matrix();
        let scenario = ScenarioDefinition::new("vol").with_volatility_shock(2.0, None);
        let shocked = engine().apply(&original, &scenario).unwrap();
        for i in 0..2 {
            let before = original.column(i);
            let after = shocked.column(i);
            assert!((stats::mean(after) - stats::mean(before)).abs() < 1e-15);
            assert!((stats::std_dev(after, 1) - 2.0 * stats::std_dev(before, 1)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_correlation_shock_hits_target_correlation() {
        let original = matrix();
        let rho = stats::correlation(original.column(0), original.column(1)).unwrap();
        let shocked = engine()
            .apply(&original, &ScenarioDefinition::new("contagion").with_correlation_shock(0.5))
            .unwrap();
        let shocked_rho = stats::correlation(shocked.column(0), shocked.column(1)).unwrap();
        assert!((shocked_rho - (0.5 * rho + 0.5)).abs() < 1e-9);
        for i in 0..2 {
            assert!(
                (stats::mean(shocked.column(i)) - stats::mean(original.column(i))).abs() < 1e-12
            );
            assert!(
                (stats::std_dev(shocked.column(i), 1) - stats::std_dev(original.column(i), 1)).abs()
                    < 1e-12
            );
        }

        let decoupled = engine()
            .apply(&original, &ScenarioDefinition::new("decouple").with_correlation_shock(-1.0))
            .unwrap();
        let decoupled_rho = stats::correlation(decoupled.column(0), decoupled.column(1)).unwrap();
        assert!(decoupled_rho.abs() < 1e-9);
    }

    #[test]
    fn test_run_leaves_original_untouched() {
        let original = matrix();
        let copy = original.clone();
        let scenarios = vec![
            ScenarioDefinition::new("crash").with_return_shock(-0.02, None),
            ScenarioDefinition::new("vol").with_volatility_shock(3.0, None),
        ];
        let analysis = engine().run(&original, &weights(), &scenarios).unwrap();
        assert_eq!(original, copy);
        assert_eq!(analysis.scenarios.len(), 2);

        let crash = &analysis.scenarios["crash"];
        assert!(crash.impact.annualized_return_change < 0.0);
        assert!(crash.window_baseline.is_none());
        let vol = &analysis.scenarios["vol"];
        assert!(vol.impact.volatility_change > 0.0);
    }

    #[test]
    fn test_horizon_compares_against_same_window() {
        let scenarios = vec![ScenarioDefinition::new("recent")
            .with_return_shock(0.0, None)
            .with_horizon(5)];
        let analysis = engine().run(&matrix(), &weights(), &scenarios).unwrap();
        let result = &analysis.scenarios["recent"];
        assert_eq!(result.periods, 5);
        assert!(result.window_baseline.is_some());
        assert!(result.impact.annualized_return_change.abs() < 1e-12);
    }

    #[test]
    fn test_invalid_scenarios() {
        let e = engine();
        let duplicate = vec![ScenarioDefinition::new("x"), ScenarioDefinition::new("x")];
        assert!(matches!(
            e.run(&matrix(), &weights(), &duplicate),
            Err(Error::InvalidParameter { .. })
        ));

        let wipeout = vec![ScenarioDefinition::new("wipeout").with_return_shock(-1.5, None)];
        assert!(matches!(
            e.run(&matrix(), &weights(), &wipeout),
            Err(Error::InvalidParameter { .. })
        ));

        let long = vec![ScenarioDefinition::new("long").with_horizon(50)];
        assert!(matches!(
            e.run(&matrix(), &weights(), &long),
            Err(Error::InsufficientData { .. })
        ));

        let unknown = vec![
            ScenarioDefinition::new("z").with_return_shock(0.1, Some(vec!["Z".to_string()])),
        ];
        assert!(e.run(&matrix(), &weights(), &unknown).is_err());
    }

    #[test]
    fn test_seeded_runs_match() {
        let engine = ScenarioEngine {
            calculator: RiskMetricsCalculator::new(&config()),
            var_engine: VarEngine::new(&config()).with_monte_carlo(MonteCarloConfig {
                simulations: 500,
                seed: Some(3),
                ..MonteCarloConfig::default()
            }),
        };
        let scenarios = vec![ScenarioDefinition::new("crash").with_return_shock(-0.01, None)];
        let first = engine.run(&matrix(), &weights(), &scenarios).unwrap();
        let second = engine.run(&matrix(), &weights(), &scenarios).unwrap();
        assert_eq!(
            first.scenarios["crash"].stressed.value_at_risk,
            second.scenarios["crash"].stressed.value_at_risk
        );
    }
}
