use log::{debug, warn};

use super::metrics_model::{DrawdownAnalysis, DrawdownPoint, RiskMetrics, RollingMetrics};
use crate::config::AnalyticsConfig;
use crate::constants::MIN_OBSERVATIONS;
use crate::errors::{Error, Result};
use crate::returns::{ReturnSeries, ReturnSeriesBuilder};
use crate::utils::stats;
use crate::var::historical_var;

/// Closed-form risk and performance statistics over a return series.
#[derive(Debug, Clone)]
pub struct RiskMetricsCalculator {
    periods_per_year: f64,
    risk_free_rate: f64,
    rolling_window: usize,
    drawdown_threshold: f64,
    var_confidence: f64,
}

impl RiskMetricsCalculator {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            periods_per_year: f64::from(config.periods_per_year),
            risk_free_rate: config.risk_free_rate,
            rolling_window: config.rolling_window,
            drawdown_threshold: config.drawdown_threshold,
            var_confidence: config.confidence_levels.first().copied().unwrap_or(0.95),
        }
    }

    pub fn periods_per_year(&self) -> f64 {
        self.periods_per_year
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    /// Point-in-time statistics over the whole series.
    pub fn calculate(
        &self,
        series: &ReturnSeries,
        benchmark: Option<&ReturnSeries>,
    ) -> Result<RiskMetrics> {
        ensure_observations("risk metrics", series.len())?;
        let values = series.simple_values();

        let total_return = stats::compound(&values);
        let annualized_return = self.annualized_return(&values);
        let annualized_volatility = self.annualized_volatility(&values);
        let sharpe_ratio = self.sharpe_ratio(annualized_return, annualized_volatility);
        let (sortino_ratio, downside_deviation) = self.sortino_ratio(&values, annualized_return);
        let max_drawdown = max_drawdown(&values);
        let calmar_ratio = if max_drawdown < 0.0 {
            Some(annualized_return / max_drawdown.abs())
        } else {
            None
        };

        let positive_periods = values.iter().filter(|r| **r > 0.0).count();
        let negative_periods = values.iter().filter(|r| **r < 0.0).count();
        let best_period = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let worst_period = values.iter().copied().fold(f64::INFINITY, f64::min);

        let benchmark = match benchmark {
            Some(b) => Some(self.benchmark_metrics(series, b)?),
            None => None,
        };

        let (start_date, end_date) = date_bounds(series)?;
        Ok(RiskMetrics {
            observations: values.len(),
            start_date,
            end_date,
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            downside_deviation,
            max_drawdown,
            calmar_ratio,
            skewness: stats::skewness(&values),
            kurtosis: stats::excess_kurtosis(&values),
            win_rate: positive_periods as f64 / values.len() as f64,
            positive_periods,
            negative_periods,
            best_period,
            worst_period,
            benchmark,
        })
    }

    /// Compounded return raised to the periods-per-year power.
    pub fn annualized_return(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let growth = 1.0 + stats::compound(values);
        if growth <= 0.0 {
            return -1.0;
        }
        growth.powf(self.periods_per_year / values.len() as f64) - 1.0
    }

    /// Per-period sample standard deviation scaled by the square root of periods per year.
    pub fn annualized_volatility(&self, values: &[f64]) -> f64 {
        stats::std_dev(values, 1) * self.periods_per_year.sqrt()
    }

    /// Excess annualized return per unit of volatility; exactly 0 on zero volatility.
    pub fn sharpe_ratio(&self, annualized_return: f64, annualized_volatility: f64) -> f64 {
        if annualized_volatility == 0.0 {
            warn!("Zero volatility, reporting a Sharpe ratio of 0");
            return 0.0;
        }
        (annualized_return - self.risk_free_rate) / annualized_volatility
    }

    /// Sortino ratio and the annualized downside deviation it divides by.
    fn sortino_ratio(&self, values: &[f64], annualized_return: f64) -> (Option<f64>, f64) {
        let target = self.risk_free_rate / self.periods_per_year;
        let downside: Vec<f64> = values.iter().copied().filter(|r| *r < target).collect();
        if downside.len() < MIN_OBSERVATIONS {
            return (None, 0.0);
        }
        let deviation = stats::std_dev(&downside, 1) * self.periods_per_year.sqrt();
        if deviation == 0.0 {
            return (None, 0.0);
        }
        (
            Some((annualized_return - self.risk_free_rate) / deviation),
            deviation,
        )
    }

    /// Drawdown path with the worst peak-to-trough episode.
    pub fn drawdown_analysis(&self, series: &ReturnSeries) -> Result<DrawdownAnalysis> {
        ensure_observations("drawdown analysis", series.len())?;
        let path = drawdown_path(&series.simple_values());
        let dates = series.dates();

        let points: Vec<DrawdownPoint> = dates
            .iter()
            .zip(path.iter())
            .map(|(date, dd)| DrawdownPoint {
                date: *date,
                drawdown: *dd,
                underwater: *dd < self.drawdown_threshold,
            })
            .collect();

        let (trough, max_drawdown) = path
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |(ti, tv), (i, v)| if v < tv { (i, v) } else { (ti, tv) });

        let (peak_date, trough_date, recovery_date, duration_periods) = if max_drawdown < 0.0 {
            let peak = path[..trough].iter().rposition(|dd| *dd >= 0.0);
            let recovery = path[trough..]
                .iter()
                .position(|dd| *dd >= 0.0)
                .map(|offset| trough + offset);
            let start = peak.map_or(-1, |p| p as i64);
            let end = recovery.unwrap_or(path.len() - 1) as i64;
            (
                peak.map(|p| dates[p]),
                Some(dates[trough]),
                recovery.map(|r| dates[r]),
                (end - start) as usize,
            )
        } else {
            (None, None, None, 0)
        };

        let negatives: Vec<f64> = path.iter().copied().filter(|dd| *dd < 0.0).collect();
        Ok(DrawdownAnalysis {
            threshold: self.drawdown_threshold,
            periods_underwater: points.iter().filter(|p| p.underwater).count(),
            points,
            max_drawdown,
            peak_date,
            trough_date,
            recovery_date,
            duration_periods,
            average_drawdown: stats::mean(&negatives),
            current_drawdown: path.last().copied().unwrap_or(0.0),
        })
    }

    /// Trailing-window volatility, Sharpe, drawdown, VaR and (with a benchmark) beta.
    ///
    /// With a benchmark every statistic runs on the dates both series share.
    pub fn rolling(
        &self,
        series: &ReturnSeries,
        benchmark: Option<&ReturnSeries>,
    ) -> Result<RollingMetrics> {
        ensure_observations("rolling metrics", series.len())?;
        let window = self.rolling_window;
        if window < MIN_OBSERVATIONS {
            return Err(Error::invalid_parameter(
                "rollingWindow",
                format!("must be at least {}, got {}", MIN_OBSERVATIONS, window),
            ));
        }
        let (series, benchmark) = match benchmark {
            Some(b) => {
                let (p, b) = ReturnSeriesBuilder::align_benchmark(series, b)?;
                (p, Some(b))
            }
            None => (series.clone(), None),
        };

        let n = series.len();
        if n < window {
            debug!(
                "Series of {} observations is shorter than the rolling window {}",
                n, window
            );
            return Ok(RollingMetrics {
                window,
                dates: Vec::new(),
                volatility: Vec::new(),
                sharpe_ratio: Vec::new(),
                max_drawdown: Vec::new(),
                var_confidence: self.var_confidence,
                value_at_risk: Vec::new(),
                beta: benchmark.map(|_| Vec::new()),
            });
        }

        let values = series.simple_values();
        let bench_values = benchmark.as_ref().map(|b| b.simple_values());
        let mut volatility = vec![None; window - 1];
        let mut sharpe_ratio = vec![None; window - 1];
        let mut drawdown = vec![None; window - 1];
        let mut value_at_risk = vec![None; window - 1];
        let mut beta = bench_values.as_ref().map(|_| vec![None; window - 1]);

        for end in window..=n {
            let slice = &values[end - window..end];
            let vol = self.annualized_volatility(slice);
            volatility.push(Some(vol));
            sharpe_ratio.push(Some(self.rolling_sharpe(slice, vol)));
            drawdown.push(Some(max_drawdown(slice)));
            value_at_risk.push(Some(historical_var(slice, self.var_confidence).0));
            if let (Some(betas), Some(b)) = (beta.as_mut(), bench_values.as_ref()) {
                betas.push(Some(ols_beta(slice, &b[end - window..end])));
            }
        }

        Ok(RollingMetrics {
            window,
            dates: series.dates().to_vec(),
            volatility,
            sharpe_ratio,
            max_drawdown: drawdown,
            var_confidence: self.var_confidence,
            value_at_risk,
            beta,
        })
    }

    // Rolling windows are evaluated many times; skip the zero-volatility warning there.
    fn rolling_sharpe(&self, slice: &[f64], vol: f64) -> f64 {
        if vol == 0.0 {
            return 0.0;
        }
        (self.annualized_return(slice) - self.risk_free_rate) / vol
    }
}

/// Drawdown at each point against the running peak of cumulative value.
///
/// The peak starts at the initial value 1.0, so every point lies in `[-1, 0]`.
pub fn drawdown_path(values: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0_f64;
    let mut peak = 1.0_f64;
    values
        .iter()
        .map(|r| {
            wealth *= 1.0 + r;
            peak = peak.max(wealth);
            (wealth / peak - 1.0).clamp(-1.0, 0.0)
        })
        .collect()
}

/// Most negative point of the drawdown path (0 when the series never declines).
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown_path(values).into_iter().fold(0.0, f64::min)
}

/// Cov(p, b) / Var(b); 0 when the benchmark does not move.
pub fn ols_beta(portfolio: &[f64], benchmark: &[f64]) -> f64 {
    let var_b = stats::variance(benchmark, 1);
    if var_b == 0.0 {
        return 0.0;
    }
    stats::covariance(portfolio, benchmark, 1) / var_b
}

pub fn ensure_observations(statistic: &str, actual: usize) -> Result<()> {
    if actual < MIN_OBSERVATIONS {
        return Err(Error::insufficient_data(statistic, MIN_OBSERVATIONS, actual));
    }
    Ok(())
}

fn date_bounds(series: &ReturnSeries) -> Result<(chrono::NaiveDate, chrono::NaiveDate)> {
    match (series.first_date(), series.last_date()) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(Error::insufficient_data("risk metrics", MIN_OBSERVATIONS, 0)),
    }
}
