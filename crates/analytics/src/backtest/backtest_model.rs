use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metrics::RiskMetrics;
use crate::returns::ReturnSeries;
use crate::utils::time_utils::CalendarPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RebalanceFrequency {
    /// Buy and hold: weights drift for the whole run
    #[default]
    None,
    Monthly,
    Quarterly,
    Annual,
}

impl RebalanceFrequency {
    pub fn calendar_period(&self) -> Option<CalendarPeriod> {
        match self {
            RebalanceFrequency::None => None,
            RebalanceFrequency::Monthly => Some(CalendarPeriod::Month),
            RebalanceFrequency::Quarterly => Some(CalendarPeriod::Quarter),
            RebalanceFrequency::Annual => Some(CalendarPeriod::Year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BacktestConfig {
    pub initial_value: f64,
    pub frequency: RebalanceFrequency,
    /// Cost per unit of traded value, e.g. 0.001 for 10 basis points
    pub transaction_cost_rate: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Overrides the engine's risk-free rate for the summary statistics
    pub risk_free_rate: Option<f64>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_value: 10_000.0,
            frequency: RebalanceFrequency::default(),
            transaction_cost_rate: 0.0,
            start_date: None,
            end_date: None,
            risk_free_rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuePoint {
    pub date: NaiveDate,
    /// Portfolio value at the end of the period, after any rebalancing costs
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceEvent {
    pub date: NaiveDate,
    /// Traded value as a fraction of the pre-trade portfolio value
    pub turnover: f64,
    pub cost: f64,
    pub value_before: f64,
    pub value_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_value: f64,
    pub final_value: f64,
    pub value_path: Vec<ValuePoint>,
    pub returns: ReturnSeries,
    pub summary: RiskMetrics,
    pub rebalances: Vec<RebalanceEvent>,
    pub total_costs: f64,
    pub total_turnover: f64,
}
