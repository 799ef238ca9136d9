use super::metrics_calculator::{ols_beta, RiskMetricsCalculator};
use super::metrics_model::BenchmarkMetrics;
use crate::errors::Result;
use crate::returns::{ReturnSeries, ReturnSeriesBuilder};
use crate::utils::stats;

impl RiskMetricsCalculator {
    /// Beta, alpha, tracking error and capture ratios against a benchmark.
    ///
    /// Both series are inner-joined on their dates first.
    pub fn benchmark_metrics(
        &self,
        portfolio: &ReturnSeries,
        benchmark: &ReturnSeries,
    ) -> Result<BenchmarkMetrics> {
        let (p, b) = ReturnSeriesBuilder::align_benchmark(portfolio, benchmark)?;
        let p = p.values();
        let b = b.values();
        let ppy = self.periods_per_year();

        let beta = ols_beta(p, b);
        let alpha = (stats::mean(p) - beta * stats::mean(b)) * ppy;

        let active: Vec<f64> = p.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
        let tracking_error = stats::std_dev(&active, 1) * ppy.sqrt();
        let information_ratio = if tracking_error == 0.0 {
            0.0
        } else {
            stats::mean(&active) * ppy / tracking_error
        };

        Ok(BenchmarkMetrics {
            benchmark_symbol: benchmark.symbol().to_string(),
            observations: p.len(),
            beta,
            alpha,
            correlation: stats::correlation(p, b),
            tracking_error,
            information_ratio,
            up_capture: capture_ratio(p, b, |r| r > 0.0),
            down_capture: capture_ratio(p, b, |r| r < 0.0),
            relative_return: stats::compound(p) - stats::compound(b),
        })
    }
}

/// Mean portfolio return over mean benchmark return on the selected benchmark periods.
fn capture_ratio(
    portfolio: &[f64],
    benchmark: &[f64],
    select: impl Fn(f64) -> bool,
) -> Option<f64> {
    let (ps, bs): (Vec<f64>, Vec<f64>) = portfolio
        .iter()
        .zip(benchmark.iter())
        .filter(|(_, b)| select(**b))
        .map(|(p, b)| (*p, *b))
        .unzip();
    if bs.is_empty() {
        return None;
    }
    let mean_b = stats::mean(&bs);
    if mean_b == 0.0 {
        return None;
    }
    Some(stats::mean(&ps) / mean_b)
}
