use std::cmp::Ordering;

use super::metrics_model::{
    CorrelationAnalysis, CorrelationPair, CorrelationStatistics, RollingCorrelation,
};
use crate::constants::MIN_OBSERVATIONS;
use crate::errors::{Error, Result};
use crate::returns::ReturnMatrix;
use crate::utils::stats;

/// Pairs at or above this absolute correlation are reported by default.
pub const DEFAULT_HIGH_CORRELATION: f64 = 0.7;

/// Pairs below this absolute correlation count as weakly correlated.
const LOW_CORRELATION: f64 = 0.3;

/// Correlation structure of a set of assets.
#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    threshold: f64,
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_HIGH_CORRELATION,
        }
    }
}

impl CorrelationAnalyzer {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::invalid_parameter(
                "threshold",
                format!("must be in [0, 1], got {}", threshold),
            ));
        }
        Ok(Self { threshold })
    }

    /// Correlation matrix, strongly correlated pairs, summary statistics and the
    /// diversification ratio for `weights` (equal weights when `None`).
    ///
    /// An asset with zero variance is uncorrelated with everything else.
    pub fn analyze(
        &self,
        returns: &ReturnMatrix,
        weights: Option<&[f64]>,
    ) -> Result<CorrelationAnalysis> {
        let n = returns.n_assets();
        if returns.n_periods() < 2 {
            return Err(Error::insufficient_data(
                "correlation analysis",
                2,
                returns.n_periods(),
            ));
        }
        let weights = match weights {
            Some(w) if w.len() != n => {
                return Err(Error::invalid_parameter(
                    "weights",
                    format!("expected {} weights, got {}", n, w.len()),
                ))
            }
            Some(w) => w.to_vec(),
            None => vec![1.0 / n as f64; n],
        };

        let columns: Vec<Vec<f64>> = (0..n).map(|i| returns.simple_column(i)).collect();
        let mut matrix = vec![vec![0.0; n]; n];
        let mut pairs = Vec::new();
        for i in 0..n {
            matrix[i][i] = 1.0;
            for j in (i + 1)..n {
                let rho = stats::correlation(&columns[i], &columns[j]).unwrap_or(0.0);
                matrix[i][j] = rho;
                matrix[j][i] = rho;
                pairs.push(CorrelationPair {
                    first: returns.symbols()[i].clone(),
                    second: returns.symbols()[j].clone(),
                    correlation: rho,
                });
            }
        }

        let statistics = self.statistics(&pairs);
        let mut high_correlations: Vec<CorrelationPair> = pairs
            .into_iter()
            .filter(|p| p.correlation.abs() >= self.threshold)
            .collect();
        high_correlations.sort_by(|a, b| {
            b.correlation
                .abs()
                .partial_cmp(&a.correlation.abs())
                .unwrap_or(Ordering::Equal)
        });

        Ok(CorrelationAnalysis {
            symbols: returns.symbols().to_vec(),
            diversification_ratio: diversification_ratio(&columns, &weights),
            matrix,
            threshold: self.threshold,
            high_correlations,
            statistics,
        })
    }

    /// Correlation of `first` and `second` over each trailing window of `window` periods.
    pub fn rolling(
        &self,
        returns: &ReturnMatrix,
        first: &str,
        second: &str,
        window: usize,
    ) -> Result<RollingCorrelation> {
        if window < MIN_OBSERVATIONS {
            return Err(Error::invalid_parameter(
                "window",
                format!("must be at least {}, got {}", MIN_OBSERVATIONS, window),
            ));
        }
        let column = |symbol: &str| {
            returns
                .index_of(symbol)
                .map(|i| returns.simple_column(i))
                .ok_or_else(|| {
                    Error::invalid_parameter(
                        "symbol",
                        format!("{} is not in the return matrix", symbol),
                    )
                })
        };
        let xs = column(first)?;
        let ys = column(second)?;

        let n = returns.n_periods();
        let mut values = Vec::with_capacity(n);
        for end in 1..=n {
            values.push(if end < window {
                None
            } else {
                stats::correlation(&xs[end - window..end], &ys[end - window..end])
            });
        }

        Ok(RollingCorrelation {
            first: first.to_string(),
            second: second.to_string(),
            window,
            dates: returns.dates().to_vec(),
            values,
        })
    }

    fn statistics(&self, pairs: &[CorrelationPair]) -> Option<CorrelationStatistics> {
        if pairs.is_empty() {
            return None;
        }
        let values: Vec<f64> = pairs.iter().map(|p| p.correlation).collect();
        let sorted = stats::sorted_copy(&values);
        Some(CorrelationStatistics {
            mean: stats::mean(&values),
            median: stats::quantile_sorted(&sorted, 0.5),
            std_dev: stats::std_dev(&values, 1),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            q25: stats::quantile_sorted(&sorted, 0.25),
            q75: stats::quantile_sorted(&sorted, 0.75),
            negative_count: values.iter().filter(|v| **v < 0.0).count(),
            high_count: values.iter().filter(|v| v.abs() >= self.threshold).count(),
            low_count: values.iter().filter(|v| v.abs() < LOW_CORRELATION).count(),
        })
    }
}

/// Weighted average volatility over portfolio volatility.
fn diversification_ratio(columns: &[Vec<f64>], weights: &[f64]) -> Option<f64> {
    let n = columns.len();
    let weighted_vol: f64 = (0..n)
        .map(|i| weights[i] * stats::std_dev(&columns[i], 1))
        .sum();
    let mut variance = 0.0;
    for i in 0..n {
        for j in 0..n {
            variance += weights[i] * weights[j] * stats::covariance(&columns[i], &columns[j], 1);
        }
    }
    if variance <= 0.0 {
        return None;
    }
    Some(weighted_vol / variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::ReturnSeries;

    fn matrix(columns: &[(&str, Vec<f64>)]) -> ReturnMatrix {
        let series: Vec<ReturnSeries> = columns
            .iter()
            .map(|(s, v)| ReturnSeries::from_values(*s, v.clone()).unwrap())
            .collect();
        ReturnMatrix::from_series(&series).unwrap()
    }

    #[test]
    fn test_perfectly_correlated_pair() {
        let a = vec![0.01, -0.02, 0.03, 0.00, 0.01];
        let b: Vec<f64> = a.iter().map(|r| 2.0 * r).collect();
        let c = vec![0.00, 0.01, -0.01, 0.02, -0.02];
        let analysis = CorrelationAnalyzer::default()
            .analyze(&matrix(&[("A", a), ("B", b), ("C", c)]), None)
            .unwrap();

        assert_eq!(analysis.matrix[0][0], 1.0);
        assert!((analysis.matrix[0][1] - 1.0).abs() < 1e-12);
        assert_eq!(analysis.matrix[0][1], analysis.matrix[1][0]);
        assert_eq!(analysis.high_correlations[0].first, "A");
        assert_eq!(analysis.high_correlations[0].second, "B");
        let stats = analysis.statistics.unwrap();
        assert!(stats.max <= 1.0);
        assert!(stats.min >= -1.0);
        assert!(stats.high_count >= 1);
    }

    #[test]
    fn test_diversification_ratio_of_identical_assets_is_one() {
        let a = vec![0.01, -0.02, 0.03, 0.00];
        let analysis = CorrelationAnalyzer::default()
            .analyze(&matrix(&[("A", a.clone()), ("B", a)]), Some(&[0.5, 0.5]))
            .unwrap();
        assert!((analysis.diversification_ratio.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_uncorrelated_assets_diversify() {
        let a = vec![0.01, -0.01, 0.01, -0.01];
        let b = vec![0.01, 0.01, -0.01, -0.01];
        let analysis = CorrelationAnalyzer::default()
            .analyze(&matrix(&[("A", a), ("B", b)]), None)
            .unwrap();
        assert!(analysis.matrix[0][1].abs() < 1e-12);
        assert!((analysis.diversification_ratio.unwrap() - 2f64.sqrt()).abs() < 1e-9);
        assert!(analysis.high_correlations.is_empty());
    }

    #[test]
    fn test_single_asset_has_no_statistics() {
        let analysis = CorrelationAnalyzer::default()
            .analyze(&matrix(&[("A", vec![0.01, 0.02, -0.01])]), None)
            .unwrap();
        assert!(analysis.statistics.is_none());
        assert_eq!(analysis.matrix, vec![vec![1.0]]);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(CorrelationAnalyzer::new(1.5).is_err());
        assert!(CorrelationAnalyzer::new(0.5).is_ok());
    }

    #[test]
    fn test_rolling_correlation_tracks_regime_change() {
        let a = vec![0.01, -0.02, 0.03, -0.01, 0.02, -0.03, 0.01, 0.02];
        // Moves with A for four periods, then against it
        let b: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, r)| if i < 4 { *r } else { -r })
            .collect();
        let returns = matrix(&[("A", a), ("B", b)]);
        let rolling = CorrelationAnalyzer::default()
            .rolling(&returns, "A", "B", 4)
            .unwrap();

        assert_eq!(rolling.window, 4);
        assert_eq!(rolling.values.len(), 8);
        assert_eq!(rolling.dates, returns.dates().to_vec());
        assert!(rolling.values[..3].iter().all(Option::is_none));
        assert!((rolling.values[3].unwrap() - 1.0).abs() < 1e-12);
        assert!((rolling.values[7].unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_correlation_flat_window_is_none() {
        let returns = matrix(&[
            ("A", vec![0.01, -0.01, 0.02, 0.0, 0.0, 0.0]),
            ("B", vec![0.02, 0.01, -0.01, 0.01, 0.02, -0.02]),
        ]);
        let rolling = CorrelationAnalyzer::default()
            .rolling(&returns, "A", "B", 3)
            .unwrap();
        assert!(rolling.values[2].is_some());
        assert!(rolling.values[5].is_none());
    }

    #[test]
    fn test_rolling_correlation_validates_input() {
        let returns = matrix(&[("A", vec![0.01, 0.02, -0.01]), ("B", vec![0.0, 0.01, 0.02])]);
        let analyzer = CorrelationAnalyzer::default();
        assert!(matches!(
            analyzer.rolling(&returns, "A", "B", 1),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            analyzer.rolling(&returns, "A", "ZZZ", 2),
            Err(Error::InvalidParameter { .. })
        ));
        // Longer than the data: every entry is None
        let rolling = analyzer.rolling(&returns, "A", "B", 10).unwrap();
        assert!(rolling.values.iter().all(Option::is_none));
    }
}
