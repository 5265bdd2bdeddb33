//! Feedback Loop Processor
//!
//! Classifies external feedback by impact and turns it into a bounded
//! settings nudge. Every processed loop is kept in a fixed-size log.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::rolling::push_bounded;
use crate::events::{InterventionKind, RiskIntervention};
use crate::utils::helpers::generate_id;
use crate::utils::types::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    SignalAccuracy,
    RiskAdjustment,
    PerformanceUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackImpact {
    Low,
    Medium,
    High,
}

fn default_source() -> String {
    "external".to_string()
}

fn default_target() -> String {
    "learning_engine".to_string()
}

/// Feedback as submitted by a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub feedback_type: FeedbackType,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl FeedbackInput {
    pub fn new(feedback_type: FeedbackType, payload: serde_json::Value) -> Self {
        Self {
            feedback_type,
            source: default_source(),
            target: default_target(),
            payload,
        }
    }

    /// Convert a risk governor intervention into risk-adjustment feedback.
    ///
    /// A hard intervention without a severity counts as high.
    pub fn from_intervention(event: &RiskIntervention) -> Self {
        let severity = event.severity.unwrap_or(match event.kind {
            InterventionKind::Hard => Severity::High,
            InterventionKind::Soft => Severity::Medium,
        });
        let payload = serde_json::json!({
            "kind": event.kind,
            "severity": severity,
            "reason": event.reason,
            "bot_id": event.bot_id,
            "symbol": event.symbol,
        });
        Self {
            feedback_type: FeedbackType::RiskAdjustment,
            source: event.source.clone().unwrap_or_else(|| "risk_governor".to_string()),
            target: default_target(),
            payload,
        }
    }

    fn severity(&self) -> Option<Severity> {
        self.payload
            .get("severity")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// A processed feedback record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackLoop {
    pub id: String,
    pub source: String,
    pub target: String,
    pub feedback_type: FeedbackType,
    pub payload: serde_json::Value,
    pub processed_at: i64,
    pub impact: FeedbackImpact,
}

pub fn assess_impact(input: &FeedbackInput) -> FeedbackImpact {
    match input.feedback_type {
        FeedbackType::RiskAdjustment if input.severity() == Some(Severity::Critical) => FeedbackImpact::High,
        FeedbackType::RiskAdjustment | FeedbackType::SignalAccuracy => FeedbackImpact::Medium,
        FeedbackType::PerformanceUpdate => FeedbackImpact::Low,
    }
}

/// Settings change implied by one feedback item
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackAction {
    /// Scale the risk multiplier and shift the confidence threshold
    AdjustRisk {
        risk_factor: f64,
        threshold_delta: f64,
    },
    /// Feed a concrete signal verdict into the signal tracker
    RecordSignal {
        signal_type: String,
        source: String,
        was_correct: bool,
        strength: Option<f64>,
    },
    /// Shift only the confidence threshold
    RaiseThreshold(f64),
    None,
}

pub fn plan_action(input: &FeedbackInput, impact: FeedbackImpact) -> FeedbackAction {
    match (input.feedback_type, impact) {
        (FeedbackType::RiskAdjustment, FeedbackImpact::High) => FeedbackAction::AdjustRisk {
            risk_factor: 0.85,
            threshold_delta: 0.05,
        },
        (FeedbackType::RiskAdjustment, _) => FeedbackAction::AdjustRisk {
            risk_factor: 0.95,
            threshold_delta: 0.0,
        },
        (FeedbackType::SignalAccuracy, _) => {
            let payload = &input.payload;
            let signal_type = payload.get("signal_type").and_then(|v| v.as_str());
            let was_correct = payload.get("was_correct").and_then(|v| v.as_bool());
            match (signal_type, was_correct) {
                (Some(signal_type), Some(was_correct)) if !signal_type.trim().is_empty() => {
                    FeedbackAction::RecordSignal {
                        signal_type: signal_type.trim().to_string(),
                        source: payload.get("source")
                            .and_then(|v| v.as_str())
                            .unwrap_or(&input.source)
                            .to_string(),
                        was_correct,
                        strength: payload.get("strength").and_then(|v| v.as_f64()),
                    }
                }
                _ => FeedbackAction::RaiseThreshold(0.01),
            }
        }
        (FeedbackType::PerformanceUpdate, _) => FeedbackAction::None,
    }
}

/// Bounded log of processed loops
pub struct FeedbackLog {
    capacity: usize,
    entries: Mutex<VecDeque<FeedbackLoop>>,
}

impl FeedbackLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Assess and record one input
    pub fn record(&self, input: &FeedbackInput, now: i64) -> FeedbackLoop {
        let entry = FeedbackLoop {
            id: generate_id(),
            source: input.source.clone(),
            target: input.target.clone(),
            feedback_type: input.feedback_type,
            payload: input.payload.clone(),
            processed_at: now,
            impact: assess_impact(input),
        };
        push_bounded(&mut self.entries.lock(), entry.clone(), self.capacity);
        entry
    }

    /// Newest first
    pub fn recent(&self, n: usize) -> Vec<FeedbackLoop> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn all(&self) -> Vec<FeedbackLoop> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn restore(&self, loops: Vec<FeedbackLoop>) {
        let mut entries = self.entries.lock();
        for entry in loops {
            push_bounded(&mut entries, entry, self.capacity);
        }
    }
}
