//! Expected-return and covariance estimation for the optimizer.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::constants::{MIN_EIGENVALUE_RATIO, MIN_OBSERVATIONS, PERFECT_CORRELATION};
use crate::errors::{Error, Result};
use crate::returns::ReturnMatrix;
use crate::utils::stats;

use super::optimization_model::{AssetUniverse, EstimationSettings, ExpectedReturnMethod};

const SYMMETRY_TOLERANCE: f64 = 1e-10;
const PSD_TOLERANCE: f64 = 1e-10;

impl AssetUniverse {
    /// Builds a universe from caller-supplied annual estimates.
    pub fn new(
        symbols: Vec<String>,
        expected_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let n = symbols.len();
        if covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
            return Err(Error::invalid_parameter(
                "covariance",
                format!("must be a {}x{} matrix", n, n),
            ));
        }
        let flat: Vec<f64> = covariance.into_iter().flatten().collect();
        Self::from_matrices(
            symbols,
            DVector::from_vec(expected_returns),
            DMatrix::from_row_slice(n, n, &flat),
        )
    }

    pub fn from_matrices(
        symbols: Vec<String>,
        expected_returns: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<Self> {
        let n = symbols.len();
        if n == 0 {
            return Err(Error::invalid_parameter("symbols", "asset universe is empty"));
        }
        for (i, symbol) in symbols.iter().enumerate() {
            if symbols[..i].contains(symbol) {
                return Err(Error::invalid_parameter(
                    "symbols",
                    format!("duplicate symbol {}", symbol),
                ));
            }
        }
        if expected_returns.len() != n {
            return Err(Error::invalid_parameter(
                "expectedReturns",
                format!("expected {} values, got {}", n, expected_returns.len()),
            ));
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(Error::invalid_parameter(
                "covariance",
                format!("must be a {}x{} matrix", n, n),
            ));
        }
        if let Some(i) = expected_returns.iter().position(|v| !v.is_finite()) {
            return Err(Error::invalid_parameter(
                "expectedReturns",
                format!("value for {} is not finite", symbols[i]),
            ));
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid_parameter(
                "covariance",
                "contains non-finite values",
            ));
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (covariance[(i, j)], covariance[(j, i)]);
                if (a - b).abs() > SYMMETRY_TOLERANCE * a.abs().max(b.abs()).max(1.0) {
                    return Err(Error::invalid_parameter(
                        "covariance",
                        format!("not symmetric at ({}, {})", symbols[i], symbols[j]),
                    ));
                }
            }
        }
        let (min_eigen, max_eigen) = eigen_range(&covariance);
        if min_eigen < -PSD_TOLERANCE * max_eigen.max(1.0) {
            return Err(Error::ill_conditioned(format!(
                "covariance is not positive semi-definite (smallest eigenvalue {:.3e})",
                min_eigen
            )));
        }

        Ok(Self {
            symbols,
            expected_returns,
            covariance,
        })
    }

    /// Estimates annual expected returns and covariance from periodic returns.
    ///
    /// Without shrinkage the sample estimate is used as is, and inputs it cannot support
    /// (no more observations than assets, perfectly correlated pairs, near-singular
    /// covariance) are rejected. With shrinkage `δ` the covariance becomes
    /// `(1 - δ)·S + δ·(tr(S)/n)·I`.
    pub fn from_returns(returns: &ReturnMatrix, settings: &EstimationSettings) -> Result<Self> {
        let n_obs = returns.n_periods();
        let n_assets = returns.n_assets();
        if n_obs < MIN_OBSERVATIONS {
            return Err(Error::insufficient_data(
                "covariance estimate",
                MIN_OBSERVATIONS,
                n_obs,
            ));
        }
        if let Some(delta) = settings.shrinkage {
            if !(0.0..=1.0).contains(&delta) {
                return Err(Error::invalid_parameter(
                    "covarianceShrinkage",
                    format!("must be in [0, 1], got {}", delta),
                ));
            }
        }
        let regularized = settings.shrinkage.is_some_and(|d| d > 0.0);
        if !regularized && n_obs <= n_assets {
            return Err(Error::ill_conditioned(format!(
                "{} observations cannot estimate a {}-asset covariance; configure shrinkage",
                n_obs, n_assets
            )));
        }

        let ppy = f64::from(settings.periods_per_year);
        let columns: Vec<Vec<f64>> = (0..n_assets).map(|i| returns.simple_column(i)).collect();

        let expected = DVector::from_iterator(
            n_assets,
            columns.iter().map(|c| match settings.method {
                ExpectedReturnMethod::Geometric => {
                    let growth = 1.0 + stats::compound(c);
                    if growth <= 0.0 {
                        -1.0
                    } else {
                        growth.powf(ppy / c.len() as f64) - 1.0
                    }
                }
                ExpectedReturnMethod::Arithmetic => stats::mean(c) * ppy,
            }),
        );

        let mut covariance = DMatrix::<f64>::zeros(n_assets, n_assets);
        for i in 0..n_assets {
            for j in i..n_assets {
                let c = stats::covariance(&columns[i], &columns[j], 1) * ppy;
                covariance[(i, j)] = c;
                covariance[(j, i)] = c;
            }
        }

        if !regularized {
            check_conditioning(returns.symbols(), &columns, &covariance)?;
        } else if let Some(delta) = settings.shrinkage {
            let target = covariance.trace() / n_assets as f64;
            covariance *= 1.0 - delta;
            for i in 0..n_assets {
                covariance[(i, i)] += delta * target;
            }
            debug!("Applied covariance shrinkage {} toward {:.6e}", delta, target);
        }

        Self::from_matrices(returns.symbols().to_vec(), expected, covariance)
    }

    /// Annual volatility of each asset.
    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.covariance[(i, i)].max(0.0).sqrt())
            .collect()
    }
}

fn check_conditioning(
    symbols: &[String],
    columns: &[Vec<f64>],
    covariance: &DMatrix<f64>,
) -> Result<()> {
    for i in 0..columns.len() {
        if stats::is_constant(&columns[i]) {
            return Err(Error::ill_conditioned(format!(
                "{} has constant returns",
                symbols[i]
            )));
        }
        for j in (i + 1)..columns.len() {
            if let Some(rho) = stats::correlation(&columns[i], &columns[j]) {
                if rho.abs() >= PERFECT_CORRELATION {
                    return Err(Error::ill_conditioned(format!(
                        "{} and {} are perfectly correlated",
                        symbols[i], symbols[j]
                    )));
                }
            }
        }
    }
    let (min_eigen, max_eigen) = eigen_range(covariance);
    if max_eigen <= 0.0 || min_eigen / max_eigen < MIN_EIGENVALUE_RATIO {
        return Err(Error::ill_conditioned(format!(
            "eigenvalue ratio {:.3e} below {:.0e}; configure shrinkage",
            if max_eigen > 0.0 { min_eigen / max_eigen } else { 0.0 },
            MIN_EIGENVALUE_RATIO
        )));
    }
    Ok(())
}

fn eigen_range(matrix: &DMatrix<f64>) -> (f64, f64) {
    let eigenvalues = matrix.clone().symmetric_eigenvalues();
    let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    let max = eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::ReturnSeries;

    fn settings(shrinkage: Option<f64>) -> EstimationSettings {
        EstimationSettings {
            method: ExpectedReturnMethod::Arithmetic,
            periods_per_year: 252,
            shrinkage,
        }
    }

    fn matrix(columns: &[(&str, Vec<f64>)]) -> ReturnMatrix {
        let series: Vec<ReturnSeries> = columns
            .iter()
            .map(|(s, v)| ReturnSeries::from_values(*s, v.clone()).unwrap())
            .collect();
        ReturnMatrix::from_series(&series).unwrap()
    }

    #[test]
    fn test_direct_universe_validation() {
        let universe = AssetUniverse::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.1, 0.05],
            vec![vec![0.04, 0.01], vec![0.01, 0.02]],
        )
        .unwrap();
        assert_eq!(universe.len(), 2);
        assert!((universe.volatilities()[0] - 0.2).abs() < 1e-12);

        let asymmetric = AssetUniverse::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.1, 0.05],
            vec![vec![0.04, 0.01], vec![0.02, 0.02]],
        );
        assert!(matches!(asymmetric, Err(Error::InvalidParameter { .. })));

        let indefinite = AssetUniverse::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.1, 0.05],
            vec![vec![0.01, 0.05], vec![0.05, 0.01]],
        );
        assert!(matches!(indefinite, Err(Error::IllConditionedCovariance(_))));
    }

    #[test]
    fn test_duplicate_symbols_rejected() {
        let result = AssetUniverse::new(
            vec!["A".to_string(), "A".to_string()],
            vec![0.1, 0.1],
            vec![vec![0.04, 0.0], vec![0.0, 0.04]],
        );
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_estimate_from_returns() {
        let returns = matrix(&[
            ("A", vec![0.01, -0.02, 0.015, -0.01, 0.03, 0.002]),
            ("B", vec![0.004, 0.01, -0.006, 0.002, -0.001, 0.003]),
        ]);
        let universe = AssetUniverse::from_returns(&returns, &settings(None)).unwrap();
        let a = returns.simple_column(0);
        assert!((universe.expected_returns()[0] - stats::mean(&a) * 252.0).abs() < 1e-12);
        assert!((universe.covariance()[(0, 0)] - stats::variance(&a, 1) * 252.0).abs() < 1e-12);
        assert_eq!(universe.covariance()[(0, 1)], universe.covariance()[(1, 0)]);
    }

    #[test]
    fn test_geometric_expected_return() {
        let returns = matrix(&[
            ("A", vec![0.1, 0.1]),
            ("B", vec![0.0, 0.05]),
            ("C", vec![0.02, -0.01]),
        ]);
        let mut s = settings(Some(0.5));
        s.method = ExpectedReturnMethod::Geometric;
        s.periods_per_year = 2;
        let universe = AssetUniverse::from_returns(&returns, &s).unwrap();
        // Two 10% periods in a two-period year compound to 21%
        assert!((universe.expected_returns()[0] - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_observations_require_shrinkage() {
        let returns = matrix(&[
            ("A", vec![0.01, 0.02]),
            ("B", vec![0.03, -0.01]),
            ("C", vec![0.0, 0.01]),
        ]);
        let result = AssetUniverse::from_returns(&returns, &settings(None));
        assert!(matches!(result, Err(Error::IllConditionedCovariance(_))));

        let universe = AssetUniverse::from_returns(&returns, &settings(Some(0.3))).unwrap();
        assert_eq!(universe.len(), 3);
    }

    #[test]
    fn test_perfect_correlation_rejected_without_shrinkage() {
        let a = vec![0.01, -0.02, 0.015, -0.01, 0.03];
        let b: Vec<f64> = a.iter().map(|r| r * 2.0).collect();
        let returns = matrix(&[("A", a), ("B", b)]);
        let result = AssetUniverse::from_returns(&returns, &settings(None));
        assert!(matches!(result, Err(Error::IllConditionedCovariance(_))));
        assert!(AssetUniverse::from_returns(&returns, &settings(Some(0.1))).is_ok());
    }

    #[test]
    fn test_single_observation_is_insufficient() {
        let returns = matrix(&[("A", vec![0.01])]);
        let result = AssetUniverse::from_returns(&returns, &settings(None));
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }
}
