use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::var::VarEstimate;

/// Point-in-time risk and performance statistics of one return series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub observations: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// Exactly 0 when volatility is 0
    pub sharpe_ratio: f64,
    /// `None` when fewer than two returns fall below the risk-free rate
    pub sortino_ratio: Option<f64>,
    pub downside_deviation: f64,
    pub max_drawdown: f64,
    /// `None` when the series never draws down
    pub calmar_ratio: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub win_rate: f64,
    pub positive_periods: usize,
    pub negative_periods: usize,
    pub best_period: f64,
    pub worst_period: f64,
    pub benchmark: Option<BenchmarkMetrics>,
}

/// Comparison of a portfolio series against a benchmark on their common dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkMetrics {
    pub benchmark_symbol: String,
    pub observations: usize,
    pub beta: f64,
    /// Annualized
    pub alpha: f64,
    pub correlation: Option<f64>,
    pub tracking_error: f64,
    /// 0 when the tracking error is 0
    pub information_ratio: f64,
    pub up_capture: Option<f64>,
    pub down_capture: Option<f64>,
    pub relative_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    pub drawdown: f64,
    pub underwater: bool,
}

/// Per-point drawdown path plus the worst episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownAnalysis {
    pub threshold: f64,
    pub points: Vec<DrawdownPoint>,
    pub max_drawdown: f64,
    /// Date of the peak preceding the worst trough; `None` when the peak is the start value
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    pub recovery_date: Option<NaiveDate>,
    /// Periods from peak to recovery (or to the end of the series when not recovered)
    pub duration_periods: usize,
    pub average_drawdown: f64,
    pub periods_underwater: usize,
    pub current_drawdown: f64,
}

/// Trailing-window statistics aligned to the series' dates.
///
/// The first `window - 1` entries are `None`; every vector is empty when the series is
/// shorter than the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingMetrics {
    pub window: usize,
    pub dates: Vec<NaiveDate>,
    pub volatility: Vec<Option<f64>>,
    pub sharpe_ratio: Vec<Option<f64>>,
    pub max_drawdown: Vec<Option<f64>>,
    pub var_confidence: f64,
    pub value_at_risk: Vec<Option<f64>>,
    pub beta: Option<Vec<Option<f64>>>,
}

impl RollingMetrics {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationPair {
    pub first: String,
    pub second: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationStatistics {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    pub negative_count: usize,
    pub high_count: usize,
    pub low_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationAnalysis {
    pub symbols: Vec<String>,
    /// Row-major, `matrix[i][j]` is the correlation of `symbols[i]` and `symbols[j]`
    pub matrix: Vec<Vec<f64>>,
    pub threshold: f64,
    pub high_correlations: Vec<CorrelationPair>,
    /// `None` for a single asset
    pub statistics: Option<CorrelationStatistics>,
    /// `None` when the weighted portfolio has zero volatility
    pub diversification_ratio: Option<f64>,
}

/// Trailing-window correlation of one asset pair. Entries before the first full window,
/// and windows where either asset does not move, are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingCorrelation {
    pub first: String,
    pub second: String,
    pub window: usize,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Everything the risk dashboard needs in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveRiskMetrics {
    pub metrics: RiskMetrics,
    pub drawdown: DrawdownAnalysis,
    pub rolling: RollingMetrics,
    pub value_at_risk: Vec<VarEstimate>,
    pub correlation: Option<CorrelationAnalysis>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data_points: usize,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub recommendations: Vec<String>,
    pub metrics: ComprehensiveRiskMetrics,
}
