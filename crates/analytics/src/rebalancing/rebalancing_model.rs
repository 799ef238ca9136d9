use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One position of the current holdings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    /// Current price per share in the portfolio currency
    pub price: Decimal,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            price,
        }
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.price
    }
}

/// Which assets receive trades once rebalancing is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RebalanceMode {
    /// Only assets whose drift exceeds the tolerance are traded
    #[default]
    Partial,
    /// Every asset is brought back to its target
    Full,
}

/// How dollar amounts are turned into share counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ShareRounding {
    /// Truncate, so a trade never exceeds its dollar amount
    #[default]
    TowardZero,
    /// Round half away from zero
    Nearest,
    /// Keep fractional shares
    Fractional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RebalancePolicy {
    pub mode: RebalanceMode,
    pub rounding: ShareRounding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecommendation {
    pub symbol: String,
    pub action: TradeAction,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    /// `target_weight - current_weight`
    pub weight_delta: Decimal,
    /// Signed: positive buys, negative sells
    pub dollar_amount: Decimal,
    /// Signed share count after rounding
    pub shares: Decimal,
    pub price: Decimal,
}

/// Current versus target weight of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDrift {
    pub symbol: String,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    /// `current_weight - target_weight`; positive when overweight
    pub drift: Decimal,
    pub exceeds_tolerance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancingPlan {
    pub rebalancing_needed: bool,
    pub total_value: Decimal,
    pub tolerance: Decimal,
    pub policy: RebalancePolicy,
    /// One row per symbol in the union of current and target allocations
    pub drift: Vec<AssetDrift>,
    pub trades: Vec<TradeRecommendation>,
    /// Cash released by the trades: sells minus buys
    pub net_cash_flow: Decimal,
}

impl RebalancingPlan {
    pub fn trade(&self, symbol: &str) -> Option<&TradeRecommendation> {
        self.trades.iter().find(|t| t.symbol == symbol)
    }

    pub fn turnover(&self) -> Decimal {
        self.trades.iter().map(|t| t.weight_delta.abs()).sum()
    }
}

/// Whole-share allocation of a cash amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscreteAllocation {
    pub shares: BTreeMap<String, Decimal>,
    pub invested: Decimal,
    pub leftover_cash: Decimal,
}
