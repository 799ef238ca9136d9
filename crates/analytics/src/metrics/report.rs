use chrono::Utc;

use super::correlation::CorrelationAnalyzer;
use super::metrics_calculator::RiskMetricsCalculator;
use super::metrics_model::{ComprehensiveRiskMetrics, RiskLevel, RiskMetrics, RiskReport};
use crate::config::AnalyticsConfig;
use crate::errors::Result;
use crate::returns::{ReturnMatrix, ReturnSeries};
use crate::var::VarEngine;

/// Assets and the weights they are held at, for the correlation section of a report.
#[derive(Debug, Clone, Copy)]
pub struct HoldingsView<'a> {
    pub returns: &'a ReturnMatrix,
    pub weights: &'a [f64],
}

/// Builds comprehensive risk metrics and scores them.
#[derive(Debug, Clone)]
pub struct RiskAnalyzer {
    calculator: RiskMetricsCalculator,
    var_engine: VarEngine,
    correlation: CorrelationAnalyzer,
}

impl RiskAnalyzer {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            calculator: RiskMetricsCalculator::new(config),
            var_engine: VarEngine::new(config),
            correlation: CorrelationAnalyzer::default(),
        }
    }

    pub fn with_correlation_analyzer(mut self, correlation: CorrelationAnalyzer) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn comprehensive(
        &self,
        portfolio: &ReturnSeries,
        benchmark: Option<&ReturnSeries>,
        holdings: Option<HoldingsView<'_>>,
    ) -> Result<ComprehensiveRiskMetrics> {
        let metrics = self.calculator.calculate(portfolio, benchmark)?;
        let drawdown = self.calculator.drawdown_analysis(portfolio)?;
        let rolling = self.calculator.rolling(portfolio, benchmark)?;
        let value_at_risk = self.var_engine.var_table(portfolio)?;
        let correlation = match holdings {
            Some(view) => Some(self.correlation.analyze(view.returns, Some(view.weights))?),
            None => None,
        };

        Ok(ComprehensiveRiskMetrics {
            start_date: metrics.start_date,
            end_date: metrics.end_date,
            data_points: metrics.observations,
            metrics,
            drawdown,
            rolling,
            value_at_risk,
            correlation,
            calculated_at: Utc::now(),
        })
    }

    /// Comprehensive metrics with a risk level and recommendations.
    pub fn report(
        &self,
        portfolio: &ReturnSeries,
        benchmark: Option<&ReturnSeries>,
        holdings: Option<HoldingsView<'_>>,
    ) -> Result<RiskReport> {
        let metrics = self.comprehensive(portfolio, benchmark, holdings)?;
        let risk_score = risk_score(&metrics.metrics);
        Ok(RiskReport {
            risk_level: risk_level(risk_score),
            risk_score,
            recommendations: recommendations(&metrics),
            metrics,
        })
    }
}

/// Sum of three 1-3 bands: volatility, max drawdown and Sharpe ratio.
pub fn risk_score(metrics: &RiskMetrics) -> u8 {
    let volatility = match metrics.annualized_volatility {
        v if v > 0.25 => 3,
        v if v > 0.15 => 2,
        _ => 1,
    };
    let drawdown = match metrics.max_drawdown.abs() {
        d if d > 0.30 => 3,
        d if d > 0.20 => 2,
        _ => 1,
    };
    let sharpe = match metrics.sharpe_ratio {
        s if s < 0.5 => 3,
        s if s < 1.0 => 2,
        _ => 1,
    };
    volatility + drawdown + sharpe
}

pub fn risk_level(score: u8) -> RiskLevel {
    match score {
        s if s >= 7 => RiskLevel::High,
        s if s >= 5 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

pub fn recommendations(report: &ComprehensiveRiskMetrics) -> Vec<String> {
    let metrics = &report.metrics;
    let mut out = Vec::new();
    if metrics.sharpe_ratio < 0.5 {
        out.push("Risk-adjusted return is low; review asset selection".to_string());
    }
    if metrics.max_drawdown.abs() > 0.25 {
        out.push("Deep drawdown observed; consider loss limits or hedges".to_string());
    }
    if metrics.annualized_volatility > 0.20 {
        out.push("High volatility; consider diversifying or hedging".to_string());
    }
    if let Some(ratio) = report
        .correlation
        .as_ref()
        .and_then(|c| c.diversification_ratio)
    {
        if ratio < 1.5 {
            out.push("Low diversification; consider adding less correlated assets".to_string());
        }
    }
    if let Some(benchmark) = &metrics.benchmark {
        if benchmark.information_ratio < 0.0 {
            out.push(format!(
                "Underperforming {}; review the investment strategy",
                benchmark.benchmark_symbol
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::VarMethod;

    fn series(symbol: &str, values: Vec<f64>) -> ReturnSeries {
        ReturnSeries::from_values(symbol, values).unwrap()
    }

    fn volatile_values() -> Vec<f64> {
        (0..60)
            .map(|i| if i % 2 == 0 { 0.04 } else { -0.045 })
            .collect()
    }

    #[test]
    fn test_comprehensive_report_sections() {
        let config = AnalyticsConfig::default()
            .with_rolling_window(20)
            .with_seed(3);
        let a = series("A", volatile_values());
        let b = series("B", (0..60).map(|i| 0.001 * (i % 5) as f64 - 0.002).collect());
        let matrix = ReturnMatrix::from_series(&[a.clone(), b.clone()]).unwrap();
        let weights = [0.5, 0.5];
        let portfolio = matrix.portfolio_series("P", &weights).unwrap();

        let report = RiskAnalyzer::new(&config)
            .report(
                &portfolio,
                Some(&b),
                Some(HoldingsView {
                    returns: &matrix,
                    weights: &weights,
                }),
            )
            .unwrap();

        let m = &report.metrics;
        assert_eq!(m.data_points, 60);
        assert_eq!(m.rolling.volatility.len(), 60);
        assert_eq!(m.value_at_risk.len(), 5);
        assert!(m
            .value_at_risk
            .iter()
            .any(|v| v.method == VarMethod::MonteCarlo));
        assert!(m.metrics.benchmark.is_some());
        assert!(m.correlation.is_some());
        assert_eq!(report.risk_level, risk_level(report.risk_score));
    }

    #[test]
    fn test_high_risk_scoring() {
        let config = AnalyticsConfig::default().with_rolling_window(20).with_seed(1);
        let report = RiskAnalyzer::new(&config)
            .report(&series("P", volatile_values()), None, None)
            .unwrap();
        // Alternating +4% / -4.5% is highly volatile and loses money
        assert_eq!(report.risk_level, RiskLevel::High);
        assert!(report.risk_score >= 7);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("volatility")));
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(risk_level(3), RiskLevel::Low);
        assert_eq!(risk_level(5), RiskLevel::Medium);
        assert_eq!(risk_level(9), RiskLevel::High);
    }
}
