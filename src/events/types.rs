//! Inbound and outbound event payloads
//!
//! Inbound payload fields are optional on purpose: upstream delivery is not
//! guaranteed well-formed and the engine defaults what it can.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::learning::{FeedbackInput, FeedbackLoop, Insight, LearningMetrics, TradeOutcome};
use crate::utils::types::{Severity, Side};

/// Reference to a signal that contributed to a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRef {
    pub id: String,
    #[serde(default)]
    pub signal_type: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeExecuted {
    pub trade_id: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub bot_id: Option<String>,
    #[serde(default)]
    pub signals: Vec<SignalRef>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
    /// Execution time (ms); defaults to receipt time
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeClosed {
    pub trade_id: Option<String>,
    /// Used when the execution event was never seen
    pub symbol: Option<String>,
    pub bot_id: Option<String>,
    pub realized_pnl: Option<f64>,
    pub exit_price: Option<f64>,
    pub holding_period_ms: Option<i64>,
    pub exit_reason: Option<String>,
    /// Worst unrealized P&L during the trade
    pub max_drawdown: Option<f64>,
    /// Best unrealized P&L during the trade
    pub max_gain: Option<f64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_type: Option<String>,
    pub source: Option<String>,
    pub was_correct: Option<bool>,
    pub strength: Option<f64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionKind {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskIntervention {
    pub kind: InterventionKind,
    pub severity: Option<Severity>,
    pub reason: Option<String>,
    /// Component that intervened (defaults to "risk_governor")
    pub source: Option<String>,
    pub bot_id: Option<String>,
    pub symbol: Option<String>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotDecision {
    pub bot_id: Option<String>,
    pub symbol: Option<String>,
    pub action: Option<String>,
    pub confidence: Option<f64>,
    pub timestamp: Option<i64>,
}

/// Events the engine consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "trade.executed")]
    TradeExecuted(TradeExecuted),
    #[serde(rename = "trade.closed")]
    TradeClosed(TradeClosed),
    #[serde(rename = "signal.outcome")]
    SignalOutcome(SignalOutcome),
    #[serde(rename = "risk.intervention")]
    RiskIntervention(RiskIntervention),
    #[serde(rename = "bot.decision")]
    BotDecision(BotDecision),
    #[serde(rename = "learning.feedback")]
    Feedback(FeedbackInput),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::TradeExecuted(_) => "trade.executed",
            InboundEvent::TradeClosed(_) => "trade.closed",
            InboundEvent::SignalOutcome(_) => "signal.outcome",
            InboundEvent::RiskIntervention(_) => "risk.intervention",
            InboundEvent::BotDecision(_) => "bot.decision",
            InboundEvent::Feedback(_) => "learning.feedback",
        }
    }

    /// Decode one JSON document
    pub fn from_json(raw: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Events the engine publishes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LearningEvent {
    #[serde(rename = "learning.feedback_processed")]
    FeedbackProcessed { feedback: FeedbackLoop },
    #[serde(rename = "learning.metrics_updated")]
    MetricsUpdated { metrics: LearningMetrics },
    #[serde(rename = "learning.outcome_processed")]
    OutcomeProcessed {
        outcome: TradeOutcome,
        insights: Vec<Insight>,
    },
    #[serde(rename = "learning.patterns_detected")]
    PatternsDetected {
        count: usize,
        pattern_ids: Vec<String>,
    },
}

impl LearningEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LearningEvent::FeedbackProcessed { .. } => "learning.feedback_processed",
            LearningEvent::MetricsUpdated { .. } => "learning.metrics_updated",
            LearningEvent::OutcomeProcessed { .. } => "learning.outcome_processed",
            LearningEvent::PatternsDetected { .. } => "learning.patterns_detected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trade_executed() {
        let raw = r#"{
            "type": "trade.executed",
            "trade_id": "t-1",
            "symbol": "AAPL",
            "side": "long",
            "price": 190.5,
            "quantity": 10,
            "bot_id": "B1",
            "signals": [{"id": "s-1", "signal_type": "rsi_oversold", "severity": "high"}]
        }"#;
        match InboundEvent::from_json(raw).unwrap() {
            InboundEvent::TradeExecuted(e) => {
                assert_eq!(e.trade_id.as_deref(), Some("t-1"));
                assert_eq!(e.side, Some(Side::Buy));
                assert_eq!(e.signals.len(), 1);
                assert_eq!(e.signals[0].severity, Some(Severity::High));
            }
            other => panic!("Wrong event type: {}", other.name()),
        }
    }

    #[test]
    fn test_decode_partial_close() {
        let raw = r#"{"type": "trade.closed", "trade_id": "t-1"}"#;
        match InboundEvent::from_json(raw).unwrap() {
            InboundEvent::TradeClosed(e) => assert!(e.realized_pnl.is_none()),
            other => panic!("Wrong event type: {}", other.name()),
        }
    }

    #[test]
    fn test_decode_unknown_type_fails() {
        let err = InboundEvent::from_json(r#"{"type": "order.book"}"#).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
