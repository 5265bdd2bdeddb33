//! Learning insights
//!
//! Short human-readable observations derived from each processed event,
//! retained in a bounded log for the dashboard.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::bot_tracker::BotUpdate;
use super::outcome_store::TradeOutcome;
use super::patterns::{PatternMatch, PatternStrength};
use super::portfolio::PortfolioUpdate;
use super::rolling::push_bounded;
use super::signal_tracker::SignalUpdate;
use crate::utils::helpers::generate_id;

const WARNING_LOSS_STREAK: u32 = 3;
const CRITICAL_LOSS_STREAK: u32 = 5;
const LARGE_LOSS_MULTIPLE: f64 = 2.0;
/// Trades needed before the average P&L is a usable baseline
const LARGE_LOSS_MIN_HISTORY: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    BotPerformance,
    SignalEffectiveness,
    SymbolPerformance,
    Risk,
    Pattern,
    Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub kind: InsightKind,
    pub level: InsightLevel,
    pub message: String,
    /// Bot id, signal key, symbol or pattern id the insight is about
    pub subject: String,
    pub created_at: i64,
}

impl Insight {
    pub fn new(kind: InsightKind, level: InsightLevel, subject: &str, message: String, now: i64) -> Self {
        Self {
            id: generate_id(),
            kind,
            level,
            message,
            subject: subject.to_string(),
            created_at: now,
        }
    }
}

pub fn bot_weight_insight(update: &BotUpdate, now: i64) -> Option<Insight> {
    let delta = update.weight_delta();
    if delta == 0.0 {
        return None;
    }
    let perf = &update.performance;
    let (direction, level) = if delta > 0.0 {
        ("raised", InsightLevel::Info)
    } else {
        ("lowered", InsightLevel::Warning)
    };
    Some(Insight::new(
        InsightKind::BotPerformance,
        level,
        &perf.bot_id,
        format!(
            "Bot {} weight {} to {:.2} (recent accuracy {:.0}%)",
            perf.bot_id,
            direction,
            perf.confidence_weight,
            perf.accuracy_score * 100.0
        ),
        now,
    ))
}

pub fn signal_weight_insight(update: &SignalUpdate, now: i64) -> Option<Insight> {
    let delta = update.multiplier_delta();
    if delta == 0.0 {
        return None;
    }
    let signal = &update.signal;
    let level = if delta > 0.0 { InsightLevel::Info } else { InsightLevel::Warning };
    Some(Insight::new(
        InsightKind::SignalEffectiveness,
        level,
        &signal.key(),
        format!(
            "Signal {} from {} now weighted {:.2} (recent effectiveness {:.0}%)",
            signal.signal_type,
            signal.source,
            signal.weight_multiplier,
            signal.effectiveness_score * 100.0
        ),
        now,
    ))
}

pub fn streak_insight(update: &PortfolioUpdate, now: i64) -> Option<Insight> {
    let streak = update.learning.loss_streak();
    let level = if streak >= CRITICAL_LOSS_STREAK {
        InsightLevel::Critical
    } else if streak >= WARNING_LOSS_STREAK {
        InsightLevel::Warning
    } else {
        return None;
    };
    Some(Insight::new(
        InsightKind::Risk,
        level,
        "portfolio",
        format!("{} consecutive losing trades", streak),
        now,
    ))
}

/// Flags a loss well beyond the typical trade size
pub fn large_loss_insight(outcome: &TradeOutcome, update: &PortfolioUpdate, now: i64) -> Option<Insight> {
    let pnl = outcome.pnl?;
    if update.previous_trades < LARGE_LOSS_MIN_HISTORY || update.previous_avg_abs_pnl <= 0.0 {
        return None;
    }
    if pnl >= -LARGE_LOSS_MULTIPLE * update.previous_avg_abs_pnl {
        return None;
    }
    Some(Insight::new(
        InsightKind::SymbolPerformance,
        InsightLevel::Warning,
        &outcome.symbol,
        format!(
            "{} loss of {:.2} is {:.1}x the average trade",
            outcome.symbol,
            pnl,
            pnl.abs() / update.previous_avg_abs_pnl
        ),
        now,
    ))
}

pub fn pattern_insight(outcome: &TradeOutcome, pattern: Option<&PatternMatch>, now: i64) -> Option<Insight> {
    let pattern = pattern.filter(|p| p.strength == PatternStrength::Strong)?;
    Some(Insight::new(
        InsightKind::Pattern,
        InsightLevel::Info,
        &pattern.id,
        format!("{} closed; strong pattern on record: {}", outcome.trade_id, pattern.description),
        now,
    ))
}

pub fn decision_insight(bot_id: &str, confidence: f64, threshold: f64, now: i64) -> Option<Insight> {
    if confidence >= threshold {
        return None;
    }
    Some(Insight::new(
        InsightKind::Decision,
        InsightLevel::Warning,
        bot_id,
        format!(
            "Bot {} acted at confidence {:.2}, below the {:.2} threshold",
            bot_id, confidence, threshold
        ),
        now,
    ))
}

/// Bounded insight history
pub struct InsightLog {
    capacity: usize,
    entries: Mutex<VecDeque<Insight>>,
}

impl InsightLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn extend(&self, insights: &[Insight]) {
        let mut entries = self.entries.lock();
        for insight in insights {
            push_bounded(&mut entries, insight.clone(), self.capacity);
        }
    }

    /// Newest first
    pub fn recent(&self, n: usize) -> Vec<Insight> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::bot_tracker::BotPerformance;
    use crate::learning::portfolio::PortfolioLearning;
    use crate::learning::signal_tracker::SignalEffectiveness;

    fn portfolio_update(previous_trades: u64, previous_avg: f64, current_streak: i32) -> PortfolioUpdate {
        PortfolioUpdate {
            previous_avg_abs_pnl: previous_avg,
            previous_trades,
            learning: PortfolioLearning {
                current_streak,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_streak_levels() {
        assert!(streak_insight(&portfolio_update(0, 0.0, -2), 0).is_none());
        assert_eq!(streak_insight(&portfolio_update(0, 0.0, -3), 0).unwrap().level, InsightLevel::Warning);
        assert_eq!(streak_insight(&portfolio_update(0, 0.0, -5), 0).unwrap().level, InsightLevel::Critical);
        assert!(streak_insight(&portfolio_update(0, 0.0, 7), 0).is_none());
    }

    #[test]
    fn test_bot_weight_insight_only_on_change() {
        let mut perf = BotPerformance::neutral("B1");
        let unchanged = BotUpdate { previous_weight: 1.0, performance: perf.clone() };
        assert!(bot_weight_insight(&unchanged, 0).is_none());

        perf.confidence_weight = 0.95;
        let lowered = BotUpdate { previous_weight: 1.0, performance: perf };
        let insight = bot_weight_insight(&lowered, 0).unwrap();
        assert_eq!(insight.level, InsightLevel::Warning);
        assert_eq!(insight.subject, "B1");
    }

    #[test]
    fn test_signal_insight_on_multiplier_move() {
        let mut signal = SignalEffectiveness::neutral("rsi", "ta");
        let unchanged = SignalUpdate { previous_multiplier: 1.0, signal: signal.clone() };
        assert!(signal_weight_insight(&unchanged, 0).is_none());

        signal.weight_multiplier = 1.1;
        let raised = SignalUpdate { previous_multiplier: 1.0, signal };
        let insight = signal_weight_insight(&raised, 7).unwrap();
        assert_eq!(insight.kind, InsightKind::SignalEffectiveness);
        assert_eq!(insight.level, InsightLevel::Info);
        assert_eq!(insight.subject, "rsi:ta");
    }

    #[test]
    fn test_decision_below_threshold() {
        assert!(decision_insight("B1", 0.7, 0.6, 0).is_none());
        let insight = decision_insight("B1", 0.5, 0.6, 0).unwrap();
        assert_eq!(insight.kind, InsightKind::Decision);
    }

    #[test]
    fn test_log_bounded_newest_first() {
        let log = InsightLog::new(2);
        let insights: Vec<_> = (0..3)
            .map(|i| Insight::new(InsightKind::Risk, InsightLevel::Info, "p", format!("n{}", i), i))
            .collect();
        log.extend(&insights);
        assert_eq!(log.len(), 2);
        assert_eq!(log.recent(5)[0].message, "n2");
    }
}
