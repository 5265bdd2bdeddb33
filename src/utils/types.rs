//! Common types used throughout the engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "long", alias = "BUY", alias = "LONG")]
    Buy,
    #[serde(alias = "short", alias = "SELL", alias = "SHORT")]
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    pub fn direction(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Severity attached to signals and risk interventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live portfolio state supplied by the caller for risk prediction.
///
/// The engine does not own portfolio state; the aggregate risk figures are
/// computed by the portfolio service and passed in as fractions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Total account equity
    pub total_equity: f64,
    /// Largest single-position share of equity (0-1)
    #[serde(default)]
    pub concentration_risk: f64,
    /// Annualized portfolio volatility (0-1)
    #[serde(default)]
    pub volatility: f64,
    /// Gross exposure / equity
    #[serde(default)]
    pub leverage: f64,
    /// Current drawdown from peak equity (0-1)
    #[serde(default)]
    pub drawdown: f64,
    #[serde(default)]
    pub positions: Vec<PositionSnapshot>,
}

/// A single open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
}

impl PositionSnapshot {
    pub fn market_value(&self) -> f64 {
        self.quantity.abs() * self.mark_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity.abs() * self.entry_price
    }
}

/// Horizon requested for a return prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionHorizon {
    Intraday,
    OneDay,
    OneWeek,
    OneMonth,
}

impl fmt::Display for PredictionHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionHorizon::Intraday => write!(f, "intraday"),
            PredictionHorizon::OneDay => write!(f, "1d"),
            PredictionHorizon::OneWeek => write!(f, "1w"),
            PredictionHorizon::OneMonth => write!(f, "1m"),
        }
    }
}

