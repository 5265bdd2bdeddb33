//! Predictive model registry
//!
//! Three lightweight rule models whose accuracy is re-measured on a
//! chronological hold-out split of the resolved outcomes.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::batch::{BatchGuard, SkipReason};
use super::outcome_store::TradeOutcome;
use crate::config::MetricsConfig;
use crate::utils::helpers::{mean, ratio_of};

const INITIAL_ACCURACY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SignalScoring,
    ReturnDirection,
    RiskClassification,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::SignalScoring,
        ModelKind::ReturnDirection,
        ModelKind::RiskClassification,
    ];

    fn id(&self) -> &'static str {
        match self {
            ModelKind::SignalScoring => "signal_scoring_v1",
            ModelKind::ReturnDirection => "return_direction_v1",
            ModelKind::RiskClassification => "risk_classification_v1",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ModelKind::SignalScoring => "Signal confidence scorer",
            ModelKind::ReturnDirection => "Per-symbol return direction",
            ModelKind::RiskClassification => "Bot loss classifier",
        }
    }

    fn features(&self) -> &'static [&'static str] {
        match self {
            ModelKind::SignalScoring => &["entry_confidence", "confidence_threshold"],
            ModelKind::ReturnDirection => &["symbol", "mean_return"],
            ModelKind::RiskClassification => &["bot_id", "bot_win_rate"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveModel {
    pub id: String,
    pub name: String,
    pub kind: ModelKind,
    pub accuracy: f64,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub features: Vec<String>,
    pub active: bool,
    pub last_trained: Option<i64>,
}

impl PredictiveModel {
    pub fn untrained(kind: ModelKind) -> Self {
        Self {
            id: kind.id().to_string(),
            name: kind.name().to_string(),
            kind,
            accuracy: INITIAL_ACCURACY,
            training_samples: 0,
            validation_samples: 0,
            features: kind.features().iter().map(|f| f.to_string()).collect(),
            active: true,
            last_trained: None,
        }
    }
}

/// Statistics learned from the training split
struct TrainingStats {
    overall_win_rate: f64,
    symbol_mean_return: HashMap<String, f64>,
    bot_win_rate: HashMap<String, f64>,
}

impl TrainingStats {
    fn fit(training: &[&TradeOutcome]) -> Self {
        let mut returns: HashMap<String, Vec<f64>> = HashMap::new();
        let mut bot_results: HashMap<String, Vec<bool>> = HashMap::new();
        for outcome in training {
            if let Some(r) = outcome.return_pct {
                returns.entry(outcome.symbol.clone()).or_default().push(r);
            }
            if let Some(bot) = &outcome.bot_id {
                bot_results.entry(bot.clone()).or_default().push(outcome.is_winner());
            }
        }
        let wins: Vec<bool> = training.iter().map(|o| o.is_winner()).collect();
        Self {
            overall_win_rate: ratio_of(wins.iter()).unwrap_or(INITIAL_ACCURACY),
            symbol_mean_return: returns.into_iter().map(|(s, r)| (s, mean(&r))).collect(),
            bot_win_rate: bot_results.into_iter()
                .filter_map(|(b, w)| ratio_of(w.iter()).map(|rate| (b, rate)))
                .collect(),
        }
    }

    /// Predicted win, or `None` when the model cannot score this outcome
    fn predict(&self, kind: ModelKind, outcome: &TradeOutcome, threshold: f64) -> Option<bool> {
        match kind {
            ModelKind::SignalScoring => outcome.entry_confidence.map(|c| c >= threshold),
            ModelKind::ReturnDirection => Some(match self.symbol_mean_return.get(&outcome.symbol) {
                Some(mean_return) => *mean_return > 0.0,
                None => self.overall_win_rate >= 0.5,
            }),
            ModelKind::RiskClassification => {
                let rate = outcome.bot_id.as_ref()
                    .and_then(|b| self.bot_win_rate.get(b))
                    .copied()
                    .unwrap_or(self.overall_win_rate);
                Some(rate >= 0.5)
            }
        }
    }
}

/// Evaluate one model on the validation split
fn validate(
    model: &PredictiveModel,
    stats: &TrainingStats,
    training_len: usize,
    validation: &[&TradeOutcome],
    threshold: f64,
    now: i64,
) -> PredictiveModel {
    let verdicts: Vec<bool> = validation.iter()
        .filter_map(|o| stats.predict(model.kind, o, threshold).map(|predicted| predicted == o.is_winner()))
        .collect();

    let mut retrained = model.clone();
    retrained.training_samples = training_len;
    retrained.validation_samples = verdicts.len();
    if let Some(accuracy) = ratio_of(verdicts.iter()) {
        retrained.accuracy = accuracy;
    }
    retrained.last_trained = Some(now);
    debug!(
        "Model {} validated on {} samples: accuracy {:.3}",
        retrained.id, retrained.validation_samples, retrained.accuracy
    );
    retrained
}

pub struct ModelRegistry {
    config: MetricsConfig,
    models: ArcSwap<Vec<PredictiveModel>>,
    guard: BatchGuard,
}

impl ModelRegistry {
    pub fn new(config: MetricsConfig) -> Self {
        let models = ModelKind::ALL.iter().map(|k| PredictiveModel::untrained(*k)).collect();
        Self {
            config,
            models: ArcSwap::from_pointee(models),
            guard: BatchGuard::new("model retraining"),
        }
    }

    pub fn models(&self) -> Vec<PredictiveModel> {
        Vec::clone(&self.models.load())
    }

    pub fn get(&self, kind: ModelKind) -> Option<PredictiveModel> {
        self.models.load().iter().find(|m| m.kind == kind).cloned()
    }

    /// Mean accuracy of active models
    pub fn average_accuracy(&self) -> f64 {
        let accuracies: Vec<f64> = self.models.load().iter()
            .filter(|m| m.active)
            .map(|m| m.accuracy)
            .collect();
        mean(&accuracies)
    }

    /// Re-measure every active model on a chronological split of `outcomes`
    pub fn retrain(
        &self,
        outcomes: &[TradeOutcome],
        confidence_threshold: f64,
        now: i64,
    ) -> Result<Vec<PredictiveModel>, SkipReason> {
        self.guard.try_run(|| {
            let required = self.config.min_training_samples.max(2);
            let mut resolved: Vec<&TradeOutcome> = outcomes.iter().filter(|o| o.is_resolved()).collect();
            if resolved.len() < required {
                info!(
                    "Model retraining skipped: {} resolved outcomes, {} required",
                    resolved.len(),
                    required
                );
                return Err(SkipReason::InsufficientData {
                    available: resolved.len(),
                    required,
                });
            }
            resolved.sort_by_key(|o| o.closed_at.unwrap_or(o.executed_at));

            let validation_len = ((resolved.len() as f64 * self.config.validation_fraction).round() as usize)
                .clamp(1, resolved.len() - 1);
            let (training, validation) = resolved.split_at(resolved.len() - validation_len);
            let stats = TrainingStats::fit(training);

            let current = self.models.load();
            let retrained: Vec<PredictiveModel> = current.iter()
                .map(|m| {
                    if m.active {
                        validate(m, &stats, training.len(), validation, confidence_threshold, now)
                    } else {
                        m.clone()
                    }
                })
                .collect();
            self.models.store(Arc::new(retrained.clone()));

            info!(
                "Models retrained on {} samples, validated on {}",
                training.len(),
                validation.len()
            );
            Ok(retrained)
        })?
    }

    pub fn restore(&self, models: Vec<PredictiveModel>) {
        if !models.is_empty() {
            self.models.store(Arc::new(models));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::outcome_store::OutcomeClass;

    fn outcome(i: usize, symbol: &str, bot: &str, win: bool, confidence: f64) -> TradeOutcome {
        let pnl = if win { 5.0 } else { -5.0 };
        TradeOutcome {
            trade_id: format!("t{}", i),
            symbol: symbol.into(),
            side: None,
            entry_price: Some(100.0),
            exit_price: None,
            quantity: Some(1.0),
            pnl: Some(pnl),
            return_pct: Some(pnl / 100.0),
            holding_period_ms: None,
            outcome: OutcomeClass::from_pnl(Some(pnl)),
            executed_at: i as i64,
            closed_at: Some(i as i64 + 10),
            signals: Vec::new(),
            bot_id: Some(bot.into()),
            entry_confidence: Some(confidence),
            exit_reason: None,
            max_adverse: None,
            max_favorable: None,
        }
    }

    /// AAPL via B1 always wins with high confidence; TSLA via B2 always loses
    fn history(n: usize) -> Vec<TradeOutcome> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    outcome(i, "AAPL", "B1", true, 0.9)
                } else {
                    outcome(i, "TSLA", "B2", false, 0.3)
                }
            })
            .collect()
    }

    #[test]
    fn test_initial_models() {
        let registry = ModelRegistry::new(MetricsConfig::default());
        let models = registry.models();
        assert_eq!(models.len(), 3);
        assert!(models.iter().all(|m| m.active && m.accuracy == 0.5 && m.last_trained.is_none()));
        assert_eq!(registry.average_accuracy(), 0.5);
    }

    #[test]
    fn test_retrain_requires_samples() {
        let registry = ModelRegistry::new(MetricsConfig::default());
        let result = registry.retrain(&history(10), 0.6, 0);
        assert_eq!(result, Err(SkipReason::InsufficientData { available: 10, required: 20 }));
    }

    #[test]
    fn test_retrain_on_separable_history() {
        let registry = ModelRegistry::new(MetricsConfig::default());
        let models = registry.retrain(&history(50), 0.6, 7).unwrap();

        for model in &models {
            assert_eq!(model.training_samples, 40);
            assert_eq!(model.validation_samples, 10);
            assert_eq!(model.accuracy, 1.0, "{} should separate perfectly", model.id);
            assert_eq!(model.last_trained, Some(7));
        }
        assert_eq!(registry.average_accuracy(), 1.0);
    }

    #[test]
    fn test_retrain_is_deterministic() {
        let registry = ModelRegistry::new(MetricsConfig::default());
        let mut outcomes = history(40);
        outcomes[35].outcome = OutcomeClass::Loss;
        let first = registry.retrain(&outcomes, 0.6, 1).unwrap();
        let second = registry.retrain(&outcomes, 0.6, 1).unwrap();
        assert_eq!(first, second);
    }
}
