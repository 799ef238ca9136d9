use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsConfig;

/// How annual expected returns are estimated from periodic returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExpectedReturnMethod {
    /// Compounded growth rate
    #[default]
    Geometric,
    /// Mean periodic return times periods per year
    Arithmetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimationSettings {
    pub method: ExpectedReturnMethod,
    pub periods_per_year: u32,
    /// Shrinkage intensity toward a scaled identity; `None` leaves the sample estimate
    /// untouched and rejects ill-conditioned inputs.
    pub shrinkage: Option<f64>,
}

impl EstimationSettings {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            method: config.expected_returns,
            periods_per_year: config.periods_per_year,
            shrinkage: config.covariance_shrinkage,
        }
    }
}

/// Symbols with their annual expected returns and covariance, owned by one
/// optimization call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetUniverse {
    pub(crate) symbols: Vec<String>,
    pub(crate) expected_returns: DVector<f64>,
    pub(crate) covariance: DMatrix<f64>,
}

impl AssetUniverse {
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn expected_returns(&self) -> &DVector<f64> {
        &self.expected_returns
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OptimizationObjective {
    MaxSharpe,
    MinVolatility,
    /// Minimize volatility subject to expected return >= target
    TargetReturn { target: f64 },
    /// Maximize expected return subject to volatility <= target
    TargetVolatility { target: f64 },
    /// Maximize expected return - risk_aversion * variance
    MaxQuadraticUtility {
        #[serde(rename = "riskAversion")]
        risk_aversion: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SolverDiagnostics {
    pub iterations: usize,
    pub primal_residual: f64,
    pub dual_residual: f64,
    pub kkt_residual: f64,
    pub polished: bool,
    /// Quadratic programs solved to produce this result
    pub solves: usize,
}

/// Result of one optimizer call; weights sum to one within 1e-6.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedPortfolio {
    pub objective: OptimizationObjective,
    pub weights: BTreeMap<String, f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub risk_free_rate: f64,
    /// Share of portfolio variance contributed by each asset (sums to one)
    pub risk_contributions: BTreeMap<String, f64>,
    pub diagnostics: SolverDiagnostics,
}

impl OptimizedPortfolio {
    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierPoint {
    pub target_return: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyPortfolioKind {
    MaxSharpe,
    MinVolatility,
    /// Caller-supplied allocation, or equal weight when none is given
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPortfolio {
    pub kind: KeyPortfolioKind,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficientFrontier {
    pub points: Vec<FrontierPoint>,
    pub key_portfolios: Vec<KeyPortfolio>,
    pub requested_points: usize,
    pub skipped_points: usize,
    pub min_return: f64,
    pub max_return: f64,
}

impl EfficientFrontier {
    pub fn key_portfolio(&self, kind: KeyPortfolioKind) -> Option<&KeyPortfolio> {
        self.key_portfolios.iter().find(|k| k.kind == kind)
    }
}
