use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;

use crate::constants::TARGET_WEIGHT_SUM_TOLERANCE;
use crate::errors::{Error, Result};
use crate::utils::stats::linspace;

use super::constraints::Constraints;
use super::optimization_model::{
    AssetUniverse, EfficientFrontier, FrontierPoint, KeyPortfolio, KeyPortfolioKind,
};
use super::optimizer::{expected_return, weight_map, MeanVarianceOptimizer, PortfolioStatistics};

impl MeanVarianceOptimizer {
    /// Traces the efficient frontier between the minimum-volatility and maximum-return
    /// portfolios.
    ///
    /// Target returns are evenly spaced and solved in parallel. A point the solver proves
    /// infeasible or fails to converge on is skipped and counted; the endpoints and
    /// invalid input still abort the whole frontier.
    /// `reference` is the caller's current allocation for the reference key portfolio;
    /// equal weight is used when it is absent.
    pub fn efficient_frontier(
        &self,
        universe: &AssetUniverse,
        constraints: &Constraints,
        reference: Option<&BTreeMap<String, f64>>,
    ) -> Result<EfficientFrontier> {
        let requested = self.frontier_points();
        if requested < 2 {
            return Err(Error::invalid_parameter(
                "frontierPoints",
                format!("must be at least 2, got {}", requested),
            ));
        }
        let reference_weights = reference_weights(universe, reference)?;
        let resolved = constraints.resolve(universe.symbols())?;

        let min_vol = self.min_volatility(universe, &resolved)?;
        let max_ret = self.max_return(universe, &resolved)?;
        let min_return = expected_return(universe, &min_vol.weights);
        let max_return = expected_return(universe, &max_ret.weights).max(min_return);

        let targets = linspace(min_return, max_return, requested);
        let solved: Vec<Option<FrontierPoint>> = targets
            .par_iter()
            .map(|&target| {
                let solution = skip_unsolved(
                    self.target_return(universe, &resolved, target),
                    &format!("frontier point at target return {:.6}", target),
                )?;
                Ok(solution.map(|solution| {
                    let stats = PortfolioStatistics::compute(
                        universe,
                        &solution.weights,
                        self.risk_free_rate(),
                    );
                    FrontierPoint {
                        target_return: target,
                        expected_return: stats.expected_return,
                        volatility: stats.volatility,
                        sharpe_ratio: stats.sharpe_ratio,
                        weights: weight_map(universe, &solution.weights),
                    }
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        let points: Vec<FrontierPoint> = solved.into_iter().flatten().collect();
        let skipped = requested - points.len();
        debug!(
            "Efficient frontier: {} points on [{:.6}, {:.6}], {} skipped",
            points.len(),
            min_return,
            max_return,
            skipped
        );

        let mut key_portfolios = Vec::with_capacity(3);
        let max_sharpe = skip_unsolved(
            self.max_sharpe(universe, &resolved),
            "max Sharpe portfolio",
        )?;
        if let Some(solved) = max_sharpe {
            key_portfolios.push(self.key_portfolio(
                universe,
                KeyPortfolioKind::MaxSharpe,
                &solved.weights,
            ));
        }
        key_portfolios.push(self.key_portfolio(
            universe,
            KeyPortfolioKind::MinVolatility,
            &min_vol.weights,
        ));
        key_portfolios.push(self.key_portfolio(
            universe,
            KeyPortfolioKind::Reference,
            &reference_weights,
        ));

        Ok(EfficientFrontier {
            points,
            key_portfolios,
            requested_points: requested,
            skipped_points: skipped,
            min_return,
            max_return,
        })
    }

    fn key_portfolio(
        &self,
        universe: &AssetUniverse,
        kind: KeyPortfolioKind,
        weights: &[f64],
    ) -> KeyPortfolio {
        let stats = PortfolioStatistics::compute(universe, weights, self.risk_free_rate());
        KeyPortfolio {
            kind,
            expected_return: stats.expected_return,
            volatility: stats.volatility,
            sharpe_ratio: stats.sharpe_ratio,
            weights: weight_map(universe, weights),
        }
    }
}

/// Infeasible and non-converged solves drop out of a sweep; any other error is fatal.
fn skip_unsolved<T>(result: Result<T>, what: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::InfeasibleConstraints(reason))
        | Err(Error::NumericalNonConvergence(reason)) => {
            warn!("Skipping {}: {}", what, reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn reference_weights(
    universe: &AssetUniverse,
    reference: Option<&BTreeMap<String, f64>>,
) -> Result<Vec<f64>> {
    let n = universe.len();
    let Some(reference) = reference else {
        return Ok(vec![1.0 / n as f64; n]);
    };
    for (symbol, weight) in reference {
        if universe.index_of(symbol).is_none() {
            return Err(Error::invalid_parameter(
                "reference",
                format!("{} is not in the asset universe", symbol),
            ));
        }
        if !weight.is_finite() {
            return Err(Error::invalid_parameter(
                "reference",
                format!("weight of {} is not finite", symbol),
            ));
        }
    }
    let weights: Vec<f64> = universe
        .symbols()
        .iter()
        .map(|s| reference.get(s).copied().unwrap_or(0.0))
        .collect();
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > TARGET_WEIGHT_SUM_TOLERANCE {
        return Err(Error::invalid_parameter(
            "reference",
            format!("weights sum to {:.6}, expected 1", sum),
        ));
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;

    fn optimizer(points: usize) -> MeanVarianceOptimizer {
        let config = AnalyticsConfig {
            frontier_points: points,
            risk_free_rate: 0.02,
            ..AnalyticsConfig::default()
        };
        MeanVarianceOptimizer::new(&config)
    }

    fn constant_correlation(n: usize, rho: f64) -> AssetUniverse {
        let vols: Vec<f64> = (0..n).map(|i| 0.10 + 0.02 * i as f64).collect();
        let covariance = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let correlation = if i == j { 1.0 } else { rho };
                        correlation * vols[i] * vols[j]
                    })
                    .collect()
            })
            .collect();
        AssetUniverse::new(
            (0..n).map(|i| format!("A{:02}", i)).collect(),
            (0..n).map(|i| 0.03 + 0.01 * i as f64).collect(),
            covariance,
        )
        .unwrap()
    }

    fn universe() -> AssetUniverse {
        AssetUniverse::new(
            vec!["BND".to_string(), "EQ".to_string(), "GLD".to_string()],
            vec![0.03, 0.09, 0.05],
            vec![
                vec![0.0025, 0.0006, 0.0004],
                vec![0.0006, 0.0400, 0.0030],
                vec![0.0004, 0.0030, 0.0225],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_frontier_spans_min_vol_to_max_return() {
        let frontier = optimizer(15)
            .efficient_frontier(&universe(), &Constraints::default(), None)
            .unwrap();
        assert_eq!(frontier.points.len(), 15);
        assert_eq!(frontier.skipped_points, 0);
        assert!((frontier.max_return - 0.09).abs() < 1e-6);

        let first = &frontier.points[0];
        let min_vol = frontier.key_portfolio(KeyPortfolioKind::MinVolatility).unwrap();
        assert!((first.volatility - min_vol.volatility).abs() < 1e-6);
    }

    #[test]
    fn test_frontier_volatility_is_monotonic() {
        let frontier = optimizer(25)
            .efficient_frontier(&universe(), &Constraints::long_only(0.0, 0.7), None)
            .unwrap();
        for pair in frontier.points.windows(2) {
            assert!(pair[0].target_return < pair[1].target_return);
            assert!(pair[0].volatility <= pair[1].volatility + 1e-7);
        }
    }

    #[test]
    fn test_key_portfolios_present() {
        let reference = BTreeMap::from([("BND".to_string(), 0.6), ("EQ".to_string(), 0.4)]);
        let frontier = optimizer(5)
            .efficient_frontier(&universe(), &Constraints::default(), Some(&reference))
            .unwrap();
        assert_eq!(frontier.key_portfolios.len(), 3);
        let reference_portfolio = frontier.key_portfolio(KeyPortfolioKind::Reference).unwrap();
        assert_eq!(reference_portfolio.weights["GLD"], 0.0);
        assert!((reference_portfolio.expected_return - (0.6 * 0.03 + 0.4 * 0.09)).abs() < 1e-12);

        let sharpe = frontier.key_portfolio(KeyPortfolioKind::MaxSharpe).unwrap();
        for point in &frontier.points {
            assert!(point.sharpe_ratio <= sharpe.sharpe_ratio + 1e-6);
        }
    }

    #[test]
    fn test_equal_weight_reference_by_default() {
        let frontier = optimizer(3)
            .efficient_frontier(&universe(), &Constraints::default(), None)
            .unwrap();
        let reference = frontier.key_portfolio(KeyPortfolioKind::Reference).unwrap();
        for w in reference.weights.values() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reference_must_sum_to_one() {
        let reference = BTreeMap::from([("BND".to_string(), 0.5)]);
        let result =
            optimizer(3).efficient_frontier(&universe(), &Constraints::default(), Some(&reference));
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_capped_ten_asset_frontier_is_complete() {
        let frontier = optimizer(30)
            .efficient_frontier(
                &constant_correlation(10, 0.3),
                &Constraints::long_only(0.0, 0.4),
                None,
            )
            .unwrap();
        assert_eq!(frontier.skipped_points, 0);
        assert_eq!(frontier.points.len(), 30);
        for point in &frontier.points {
            let sum: f64 = point.weights.values().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            for w in point.weights.values() {
                assert!(*w >= 0.0 && *w <= 0.4, "weight {} outside bounds", w);
            }
        }
        for pair in frontier.points.windows(2) {
            assert!(pair[0].target_return < pair[1].target_return);
            assert!(pair[0].volatility <= pair[1].volatility + 1e-5);
        }
    }

    #[test]
    fn test_unsolved_points_are_skipped() {
        let skipped: Result<Option<u8>> = skip_unsolved(
            Err(Error::NumericalNonConvergence("reached 20000 iterations".to_string())),
            "point",
        );
        assert_eq!(skipped.unwrap(), None);

        let infeasible: Result<Option<u8>> =
            skip_unsolved(Err(Error::infeasible("target above maximum")), "point");
        assert_eq!(infeasible.unwrap(), None);

        assert_eq!(skip_unsolved(Ok(3u8), "point").unwrap(), Some(3));

        let invalid: Result<Option<u8>> =
            skip_unsolved(Err(Error::invalid_parameter("target", "not finite")), "point");
        assert!(matches!(invalid, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_max_sharpe_omitted_when_rate_too_high() {
        let frontier = optimizer(3)
            .with_risk_free_rate(0.5)
            .efficient_frontier(&universe(), &Constraints::default(), None)
            .unwrap();
        assert!(frontier.key_portfolio(KeyPortfolioKind::MaxSharpe).is_none());
        assert_eq!(frontier.key_portfolios.len(), 2);
    }
}
