//! Risk and Return Predictor
//!
//! Additive threshold scoring over caller-supplied portfolio state and the
//! stored outcome history:
//! - Portfolio risk (concentration, volatility, leverage, drawdown, recent form)
//! - Position risk (weight, unrealized loss, symbol history, leverage)
//! - Per-symbol return distribution
//!
//! Nothing here mutates engine state.

use serde::{Deserialize, Serialize};

use super::outcome_store::TradeOutcome;
use crate::config::PredictorConfig;
use crate::utils::helpers::{mean, population_std_dev, ratio_of};
use crate::utils::types::{PortfolioSnapshot, PositionSnapshot, PredictionHorizon};

const MAX_PROBABILITY: f64 = 0.95;
const MAX_RETURN_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            RiskLevel::Low
        } else if score < 0.5 {
            RiskLevel::Medium
        } else if score < 0.75 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// One contributing factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub value: f64,
    pub threshold: f64,
    pub contribution: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    /// "portfolio" or the position symbol
    pub subject: String,
    pub risk_level: RiskLevel,
    /// Sum of factor contributions
    pub score: f64,
    pub probability: f64,
    pub confidence: f64,
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub predicted_at: i64,
}

impl RiskPrediction {
    pub fn has_factor(&self, name: &str) -> bool {
        self.factors.iter().any(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnPrediction {
    pub symbol: String,
    pub horizon: PredictionHorizon,
    pub expected_return: f64,
    pub volatility: f64,
    pub upside: f64,
    pub downside: f64,
    pub confidence: f64,
    pub samples: usize,
    pub predicted_at: i64,
}

/// Accumulates factors the same way for portfolio and position scoring
#[derive(Default)]
struct RiskScore {
    score: f64,
    factors: Vec<RiskFactor>,
    recommendations: Vec<String>,
}

impl RiskScore {
    fn add(&mut self, name: &str, value: f64, threshold: f64, contribution: f64, description: String, recommendation: &str) {
        self.score += contribution;
        self.factors.push(RiskFactor {
            name: name.to_string(),
            value,
            threshold,
            contribution,
            description,
        });
        self.recommendations.push(recommendation.to_string());
    }

    fn finish(self, subject: &str, confidence: f64, now: i64) -> RiskPrediction {
        let score = (self.score * 1e9).round() / 1e9;
        RiskPrediction {
            subject: subject.to_string(),
            risk_level: RiskLevel::from_score(score),
            score,
            probability: score.min(MAX_PROBABILITY),
            confidence,
            factors: self.factors,
            recommendations: self.recommendations,
            predicted_at: now,
        }
    }
}

/// Confidence in a risk call grows with the resolved history behind it
fn history_confidence(history: &[TradeOutcome]) -> f64 {
    let resolved = history.iter().filter(|o| o.is_resolved()).count();
    0.3 + 0.6 * (resolved as f64 / 100.0).min(1.0)
}

/// Win rate over the newest `window` resolved outcomes, with the sample count
fn recent_win_rate<'a>(
    history: impl DoubleEndedIterator<Item = &'a TradeOutcome>,
    window: usize,
) -> Option<(f64, usize)> {
    let wins: Vec<bool> = history.rev()
        .filter(|o| o.is_resolved())
        .take(window)
        .map(TradeOutcome::is_winner)
        .collect();
    ratio_of(wins.iter()).map(|rate| (rate, wins.len()))
}

pub struct Predictor {
    config: PredictorConfig,
}

impl Predictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    /// Score aggregate portfolio risk; `history` is oldest first
    pub fn predict_portfolio_risk(
        &self,
        portfolio: &PortfolioSnapshot,
        history: &[TradeOutcome],
        now: i64,
    ) -> RiskPrediction {
        let c = &self.config;
        let mut risk = RiskScore::default();

        if portfolio.concentration_risk > c.concentration_threshold {
            risk.add(
                "concentration_risk",
                portfolio.concentration_risk,
                c.concentration_threshold,
                0.30,
                format!("Largest position is {:.0}% of the portfolio", portfolio.concentration_risk * 100.0),
                "Reduce the largest positions to diversify exposure",
            );
        }
        if portfolio.volatility > c.volatility_threshold {
            risk.add(
                "volatility",
                portfolio.volatility,
                c.volatility_threshold,
                0.25,
                format!("Portfolio volatility at {:.0}%", portfolio.volatility * 100.0),
                "Scale down position sizes while volatility is elevated",
            );
        }
        if portfolio.leverage > c.leverage_threshold {
            risk.add(
                "leverage",
                portfolio.leverage,
                c.leverage_threshold,
                0.25,
                format!("Leverage at {:.2}x", portfolio.leverage),
                "Deleverage toward the target exposure",
            );
        }
        if portfolio.drawdown > c.drawdown_threshold {
            risk.add(
                "drawdown",
                portfolio.drawdown,
                c.drawdown_threshold,
                0.20,
                format!("Drawdown of {:.1}% from peak equity", portfolio.drawdown * 100.0),
                "Tighten stops until the drawdown recovers",
            );
        }
        if let Some((rate, n)) = recent_win_rate(history.iter(), c.recent_performance_window) {
            if n >= c.recent_performance_min_trades && rate < c.poor_win_rate {
                risk.add(
                    "recent_performance",
                    rate,
                    c.poor_win_rate,
                    0.10,
                    format!("Recent win rate {:.0}% over {} trades", rate * 100.0, n),
                    "Review strategy parameters after the recent losing run",
                );
            }
        }

        risk.finish("portfolio", history_confidence(history), now)
    }

    /// Score one position in the context of its portfolio
    pub fn predict_position_risk(
        &self,
        position: &PositionSnapshot,
        portfolio: &PortfolioSnapshot,
        history: &[TradeOutcome],
        now: i64,
    ) -> RiskPrediction {
        let c = &self.config;
        let mut risk = RiskScore::default();

        if portfolio.total_equity > 0.0 {
            let weight = position.market_value() / portfolio.total_equity;
            if weight > c.position_weight_threshold {
                risk.add(
                    "position_weight",
                    weight,
                    c.position_weight_threshold,
                    0.35,
                    format!("{} is {:.0}% of equity", position.symbol, weight * 100.0),
                    "Trim the position toward its target weight",
                );
            }
        }

        let basis = position.cost_basis();
        if basis > 0.0 {
            let pnl = if position.unrealized_pnl != 0.0 {
                position.unrealized_pnl
            } else {
                (position.mark_price - position.entry_price) * position.quantity.abs() * position.side.direction()
            };
            let loss = -pnl / basis;
            if loss > c.unrealized_loss_threshold {
                let (threshold, contribution) = if loss > c.severe_unrealized_loss_threshold {
                    (c.severe_unrealized_loss_threshold, 0.45)
                } else {
                    (c.unrealized_loss_threshold, 0.30)
                };
                risk.add(
                    "unrealized_loss",
                    loss,
                    threshold,
                    contribution,
                    format!("Unrealized loss of {:.1}%", loss * 100.0),
                    "Re-evaluate the thesis or cut the position",
                );
            }
        }

        let symbol_history = history.iter().filter(|o| o.symbol == position.symbol);
        if let Some((rate, n)) = recent_win_rate(symbol_history, usize::MAX) {
            if n >= c.symbol_history_min_trades && rate < c.poor_win_rate {
                risk.add(
                    "symbol_history",
                    rate,
                    c.poor_win_rate,
                    0.15,
                    format!("{} has won {:.0}% of {} trades", position.symbol, rate * 100.0, n),
                    "Be selective with this symbol given its track record",
                );
            }
        }

        if portfolio.leverage > c.leverage_threshold {
            risk.add(
                "portfolio_leverage",
                portfolio.leverage,
                c.leverage_threshold,
                0.10,
                format!("Portfolio leverage at {:.2}x", portfolio.leverage),
                "Deleverage the portfolio",
            );
        }

        risk.finish(&position.symbol, history_confidence(history), now)
    }

    /// Return distribution for one symbol, or `None` below the history minimum
    pub fn predict_return(
        &self,
        symbol: &str,
        horizon: PredictionHorizon,
        history: &[TradeOutcome],
        now: i64,
    ) -> Option<ReturnPrediction> {
        let returns: Vec<f64> = history.iter()
            .filter(|o| o.symbol == symbol && o.is_resolved())
            .filter_map(|o| o.return_pct)
            .collect();
        if returns.len() < self.config.min_return_history {
            return None;
        }

        let expected = mean(&returns);
        let volatility = population_std_dev(&returns);
        Some(ReturnPrediction {
            symbol: symbol.to_string(),
            horizon,
            expected_return: expected,
            volatility,
            upside: expected + volatility,
            downside: expected - volatility,
            confidence: (returns.len() as f64 / 100.0).min(MAX_RETURN_CONFIDENCE),
            samples: returns.len(),
            predicted_at: now,
        })
    }
}
