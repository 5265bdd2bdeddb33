//! Engine State Module
//!
//! Every piece of mutable learning state, owned in one place and handed to
//! the engine at construction. Components synchronize internally.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::config::LearningConfig;
use crate::learning::{
    AdaptiveSettingsStore, BotTracker, FeedbackLog, InsightLog, MetricsAggregator, ModelRegistry,
    OutcomeStore, PatternAnalyzer, PortfolioTracker, Predictor, SignalTracker,
};

/// Monotonic event counters
#[derive(Debug, Default)]
pub struct EngineCounters {
    pub events_received: AtomicU64,
    pub events_skipped: AtomicU64,
    pub trades_executed: AtomicU64,
    pub trades_resolved: AtomicU64,
    pub replayed_closes: AtomicU64,
    pub signal_outcomes: AtomicU64,
    pub interventions: AtomicU64,
    pub bot_decisions: AtomicU64,
    pub feedback_processed: AtomicU64,
    pub last_event_at: AtomicI64,
}

impl EngineCounters {
    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_event(&self, now: i64) {
        Self::increment(&self.events_received);
        self.last_event_at.store(now, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            trades_executed: self.trades_executed.load(Ordering::Relaxed),
            trades_resolved: self.trades_resolved.load(Ordering::Relaxed),
            replayed_closes: self.replayed_closes.load(Ordering::Relaxed),
            signal_outcomes: self.signal_outcomes.load(Ordering::Relaxed),
            interventions: self.interventions.load(Ordering::Relaxed),
            bot_decisions: self.bot_decisions.load(Ordering::Relaxed),
            feedback_processed: self.feedback_processed.load(Ordering::Relaxed),
            last_event_at: self.last_event_at.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub events_received: u64,
    pub events_skipped: u64,
    pub trades_executed: u64,
    pub trades_resolved: u64,
    pub replayed_closes: u64,
    pub signal_outcomes: u64,
    pub interventions: u64,
    pub bot_decisions: u64,
    pub feedback_processed: u64,
    pub last_event_at: i64,
}

/// Central learning state store
pub struct EngineState {
    pub config: LearningConfig,
    pub outcomes: OutcomeStore,
    pub bots: BotTracker,
    pub signals: SignalTracker,
    pub patterns: PatternAnalyzer,
    pub predictor: Predictor,
    pub feedback: FeedbackLog,
    pub settings: AdaptiveSettingsStore,
    pub metrics: MetricsAggregator,
    pub models: ModelRegistry,
    pub insights: InsightLog,
    pub portfolio: PortfolioTracker,
    pub counters: EngineCounters,
}

impl EngineState {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            outcomes: OutcomeStore::new(config.store.outcome_capacity),
            bots: BotTracker::new(config.bots.clone()),
            signals: SignalTracker::new(config.signals.clone()),
            patterns: PatternAnalyzer::new(config.patterns.clone()),
            predictor: Predictor::new(config.predictor.clone()),
            feedback: FeedbackLog::new(config.store.feedback_capacity),
            settings: AdaptiveSettingsStore::new(config.settings.clone(), &config.bots, &config.signals),
            metrics: MetricsAggregator::new(config.metrics.window),
            models: ModelRegistry::new(config.metrics.clone()),
            insights: InsightLog::new(config.store.insight_capacity),
            portfolio: PortfolioTracker::new(),
            counters: EngineCounters::default(),
            config,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(LearningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_built_from_config() {
        let mut config = LearningConfig::default();
        config.store.outcome_capacity = 25;
        let state = EngineState::new(config);
        assert_eq!(state.outcomes.capacity(), 25);
        assert_eq!(state.settings.current().risk_multiplier, 1.0);
        assert_eq!(state.models.models().len(), 3);
    }

    #[test]
    fn test_counters() {
        let counters = EngineCounters::default();
        counters.mark_event(42);
        EngineCounters::increment(&counters.trades_resolved);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.events_received, 1);
        assert_eq!(snapshot.trades_resolved, 1);
        assert_eq!(snapshot.last_event_at, 42);
    }
}
