//! Learning Engine
//!
//! Facade over the engine state. Consumes inbound events one at a time,
//! runs the batch passes on demand, answers queries and publishes outbound
//! events through the injected sink.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::aggregator::LearningMetrics;
use super::batch::SkipReason;
use super::bot_tracker::BotPerformance;
use super::feedback::{plan_action, FeedbackAction, FeedbackInput, FeedbackLoop};
use super::insights::{
    bot_weight_insight, decision_insight, large_loss_insight, pattern_insight, signal_weight_insight,
    streak_insight, Insight,
};
use super::models::PredictiveModel;
use super::outcome_store::{CloseResult, TradeOutcome};
use super::patterns::{AnalysisOutcome, PatternMatch, PatternType};
use super::portfolio::PortfolioLearning;
use super::predictor::{ReturnPrediction, RiskPrediction};
use super::settings::AdaptiveSettings;
use super::signal_tracker::SignalEffectiveness;
use crate::config::LearningConfig;
use crate::error::{require_id, IngestError};
use crate::events::{
    BotDecision, EventSink, InboundEvent, LearningEvent, SignalOutcome, TradeClosed, TradeExecuted,
};
use crate::state::{CounterSnapshot, EngineCounters, EngineState};
use crate::telemetry;
use crate::utils::helpers::{current_timestamp_millis, elapsed_ms};
use crate::utils::types::{PortfolioSnapshot, PositionSnapshot, PredictionHorizon};

const DASHBOARD_TOP_BOTS: usize = 5;
const DASHBOARD_INSIGHTS: usize = 10;
const UNKNOWN_SOURCE: &str = "unknown";

/// Headline counts for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardOverview {
    pub stored_outcomes: usize,
    pub open_outcomes: usize,
    pub tracked_bots: usize,
    pub tracked_signals: usize,
    pub pattern_count: usize,
    pub feedback_count: usize,
    pub counters: CounterSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningDashboard {
    pub overview: DashboardOverview,
    pub metrics: LearningMetrics,
    pub portfolio: PortfolioLearning,
    pub top_bots: Vec<BotPerformance>,
    pub settings: AdaptiveSettings,
    pub models: Vec<PredictiveModel>,
    pub recent_insights: Vec<Insight>,
}

/// Serializable export of the learned state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub exported_at: i64,
    pub outcomes: Vec<TradeOutcome>,
    pub bots: Vec<BotPerformance>,
    pub signals: Vec<SignalEffectiveness>,
    pub settings: AdaptiveSettings,
    pub patterns: Vec<PatternMatch>,
    pub feedback: Vec<FeedbackLoop>,
    pub models: Vec<PredictiveModel>,
    pub portfolio: PortfolioLearning,
    pub metrics: LearningMetrics,
}

pub struct LearningEngine {
    state: Arc<EngineState>,
    sink: Arc<dyn EventSink>,
}

impl LearningEngine {
    pub fn new(config: LearningConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_state(Arc::new(EngineState::new(config)), sink)
    }

    pub fn with_state(state: Arc<EngineState>, sink: Arc<dyn EventSink>) -> Self {
        Self { state, sink }
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    fn publish(&self, event: LearningEvent) {
        debug!("Publishing {}", event.name());
        self.sink.publish(event);
    }

    fn skip(&self, event: &'static str, err: IngestError) -> bool {
        warn!("Skipping {} event: {}", event, err);
        EngineCounters::increment(&self.state.counters.events_skipped);
        telemetry::record_event_skipped(err.kind());
        false
    }

    // ---- Event handling ----

    /// Apply one inbound event. Returns false when the event was skipped.
    pub fn handle(&self, event: InboundEvent) -> bool {
        let now = current_timestamp_millis();
        let name = event.name();
        self.state.counters.mark_event(now);
        telemetry::record_event(name);

        let result = match event {
            InboundEvent::TradeExecuted(e) => self.on_trade_executed(&e, now),
            InboundEvent::TradeClosed(e) => self.on_trade_closed(&e, now),
            InboundEvent::SignalOutcome(e) => self.on_signal_outcome(&e, now),
            InboundEvent::RiskIntervention(e) => {
                EngineCounters::increment(&self.state.counters.interventions);
                self.process_feedback(FeedbackInput::from_intervention(&e));
                Ok(())
            }
            InboundEvent::BotDecision(e) => self.on_bot_decision(&e, now),
            InboundEvent::Feedback(input) => {
                self.process_feedback(input);
                Ok(())
            }
        };

        match result {
            Ok(()) => true,
            Err(err) => self.skip(name, err),
        }
    }

    /// Decode and apply one JSON event
    pub fn handle_json(&self, raw: &str) -> bool {
        match InboundEvent::from_json(raw) {
            Ok(event) => self.handle(event),
            Err(err) => self.skip("undecodable", err),
        }
    }

    /// Drain the inbound queue until every sender is dropped
    pub async fn run_inbound(&self, mut rx: mpsc::Receiver<InboundEvent>) -> u64 {
        let mut handled = 0u64;
        while let Some(event) = rx.recv().await {
            self.handle(event);
            handled += 1;
        }
        info!("Inbound queue closed after {} events", handled);
        handled
    }

    fn on_trade_executed(&self, event: &TradeExecuted, now: i64) -> Result<(), IngestError> {
        let outcome = self.state.outcomes.record_trade_execution(event, now)?;
        EngineCounters::increment(&self.state.counters.trades_executed);
        debug!("Trade {} opened on {}", outcome.trade_id, outcome.symbol);
        Ok(())
    }

    fn on_trade_closed(&self, event: &TradeClosed, now: i64) -> Result<(), IngestError> {
        match self.state.outcomes.record_trade_outcome(event, now)? {
            CloseResult::Resolved(outcome) => self.on_resolved(outcome, now),
            CloseResult::Replayed(outcome) => {
                EngineCounters::increment(&self.state.counters.replayed_closes);
                debug!("Trade {} close re-delivered, statistics unchanged", outcome.trade_id);
            }
            CloseResult::StillOpen(outcome) => {
                debug!("Trade {} close carried no P&L, still open", outcome.trade_id);
            }
        }
        Ok(())
    }

    /// Fold a newly resolved trade into every learner exactly once
    fn on_resolved(&self, outcome: TradeOutcome, now: i64) {
        let state = &self.state;
        EngineCounters::increment(&state.counters.trades_resolved);
        telemetry::record_outcome_resolved(outcome.is_winner());

        let pnl = outcome.pnl.unwrap_or_default();
        let mut insights = Vec::new();

        if let Some(bot_id) = outcome.bot_id.as_deref() {
            let update = state.bots.update(bot_id, outcome.is_winner(), pnl, outcome.holding_period_ms, now);
            insights.extend(bot_weight_insight(&update, now));
        }

        let portfolio = state.portfolio.record(&outcome, now);
        insights.extend(streak_insight(&portfolio, now));
        insights.extend(large_loss_insight(&outcome, &portfolio, now));

        let symbol_pattern = state.patterns.get(&format!("symbol:{}", outcome.symbol));
        insights.extend(pattern_insight(&outcome, symbol_pattern.as_ref(), now));

        state.insights.extend(&insights);
        debug!(
            "Trade {} resolved as {:?} ({} insights)",
            outcome.trade_id,
            outcome.outcome,
            insights.len()
        );
        self.publish(LearningEvent::OutcomeProcessed { outcome, insights });
    }

    fn on_signal_outcome(&self, event: &SignalOutcome, now: i64) -> Result<(), IngestError> {
        let signal_type = require_id(event.signal_type.as_deref(), "signal_type")?;
        let correct = event.was_correct.ok_or(IngestError::MissingField { field: "was_correct" })?;
        let source = event.source.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SOURCE);

        let update = self.state.signals.update(
            &signal_type,
            source,
            correct,
            event.strength,
            event.timestamp.unwrap_or(now),
        );
        if let Some(insight) = signal_weight_insight(&update, now) {
            self.state.insights.extend(std::slice::from_ref(&insight));
        }
        EngineCounters::increment(&self.state.counters.signal_outcomes);
        Ok(())
    }

    fn on_bot_decision(&self, event: &BotDecision, now: i64) -> Result<(), IngestError> {
        let bot_id = require_id(event.bot_id.as_deref(), "bot_id")?;
        let confidence = event.confidence.filter(|c| c.is_finite());
        self.state.bots.record_decision(&bot_id, confidence, now);
        EngineCounters::increment(&self.state.counters.bot_decisions);

        if let Some(confidence) = confidence {
            let threshold = self.state.settings.current().confidence_threshold;
            if let Some(insight) = decision_insight(&bot_id, confidence, threshold, now) {
                self.state.insights.extend(std::slice::from_ref(&insight));
            }
        }
        Ok(())
    }

    // ---- Batch passes ----

    /// Record and apply one feedback item, then refresh the tracker weights
    pub fn process_feedback(&self, input: FeedbackInput) -> FeedbackLoop {
        let now = current_timestamp_millis();
        let state = &self.state;
        let record = state.feedback.record(&input, now);

        match plan_action(&input, record.impact) {
            FeedbackAction::AdjustRisk { risk_factor, threshold_delta } => {
                state.settings.adjust_risk(risk_factor, threshold_delta, now);
            }
            FeedbackAction::RecordSignal { signal_type, source, was_correct, strength } => {
                let update = state.signals.update(&signal_type, &source, was_correct, strength, now);
                if let Some(insight) = signal_weight_insight(&update, now) {
                    state.insights.extend(std::slice::from_ref(&insight));
                }
            }
            FeedbackAction::RaiseThreshold(delta) => {
                state.settings.shift_threshold(delta, now);
            }
            FeedbackAction::None => {}
        }
        state.settings.sync_weights(state.bots.weights(), state.signals.weights(), now);

        EngineCounters::increment(&state.counters.feedback_processed);
        telemetry::record_feedback(record.impact);
        info!(
            "Feedback {} from {} processed ({:?}, {:?} impact)",
            record.id, record.source, record.feedback_type, record.impact
        );
        self.publish(LearningEvent::FeedbackProcessed { feedback: record.clone() });
        record
    }

    pub fn run_pattern_analysis(&self) -> AnalysisOutcome {
        let started = Instant::now();
        let outcomes = self.state.outcomes.all();
        let result = self.state.patterns.analyze(&outcomes);

        match &result {
            AnalysisOutcome::Completed { detected, table_size } => {
                telemetry::record_batch_duration("patterns", elapsed_ms(started) as f64);
                telemetry::record_pattern_count(*table_size);
                self.publish(LearningEvent::PatternsDetected {
                    count: detected.len(),
                    pattern_ids: detected.clone(),
                });
            }
            AnalysisOutcome::Skipped(_) => telemetry::record_batch_skipped("patterns"),
        }
        result
    }

    pub fn run_metrics_pass(&self) -> Result<LearningMetrics, SkipReason> {
        let started = Instant::now();
        let state = &self.state;
        let outcomes = state.outcomes.window(state.metrics.window());
        let result = state.metrics.refresh(
            &outcomes,
            state.patterns.len(),
            state.models.average_accuracy(),
            current_timestamp_millis(),
        );

        match &result {
            Ok(metrics) => {
                telemetry::record_batch_duration("metrics", elapsed_ms(started) as f64);
                telemetry::record_learning_metrics(metrics);
                self.publish(LearningEvent::MetricsUpdated { metrics: metrics.clone() });
            }
            Err(_) => telemetry::record_batch_skipped("metrics"),
        }
        result
    }

    pub fn retrain_models(&self) -> Result<Vec<PredictiveModel>, SkipReason> {
        let started = Instant::now();
        let threshold = self.state.settings.current().confidence_threshold;
        let outcomes = self.state.outcomes.all();
        let result = self.state.models.retrain(&outcomes, threshold, current_timestamp_millis());

        match &result {
            Ok(_) => telemetry::record_batch_duration("retrain", elapsed_ms(started) as f64),
            Err(_) => telemetry::record_batch_skipped("retrain"),
        }
        result
    }

    pub fn reconcile_settings(&self) -> Arc<AdaptiveSettings> {
        let state = &self.state;
        let recent = state.outcomes.window(state.config.settings.reconcile_window);
        let reconciliation = state.settings.reconcile(
            state.bots.weights(),
            state.signals.weights(),
            &recent,
            current_timestamp_millis(),
        );
        telemetry::record_settings(&reconciliation.settings);
        reconciliation.settings
    }

    // ---- Queries ----

    pub fn patterns(&self, pattern_type: Option<PatternType>) -> Vec<PatternMatch> {
        self.state.patterns.patterns(pattern_type)
    }

    pub fn models(&self) -> Vec<PredictiveModel> {
        self.state.models.models()
    }

    pub fn metrics(&self) -> Arc<LearningMetrics> {
        self.state.metrics.current()
    }

    pub fn recent_feedback(&self, n: usize) -> Vec<FeedbackLoop> {
        self.state.feedback.recent(n)
    }

    pub fn recent_outcomes(&self, n: usize) -> Vec<TradeOutcome> {
        self.state.outcomes.recent(n)
    }

    pub fn outcome(&self, trade_id: &str) -> Option<TradeOutcome> {
        self.state.outcomes.get(trade_id)
    }

    pub fn bot_performance(&self, bot_id: &str) -> BotPerformance {
        self.state.bots.get(bot_id)
    }

    pub fn top_bots(&self, n: usize) -> Vec<BotPerformance> {
        self.state.bots.top(n)
    }

    pub fn signal_effectiveness(&self, signal_type: &str, source: &str) -> SignalEffectiveness {
        self.state.signals.get(signal_type, source)
    }

    pub fn signals_by_type(&self, signal_type: &str) -> Vec<SignalEffectiveness> {
        self.state.signals.by_type(signal_type)
    }

    pub fn adaptive_settings(&self) -> Arc<AdaptiveSettings> {
        self.state.settings.current()
    }

    pub fn portfolio_learning(&self) -> PortfolioLearning {
        self.state.portfolio.current()
    }

    pub fn recent_insights(&self, n: usize) -> Vec<Insight> {
        self.state.insights.recent(n)
    }

    pub fn dashboard(&self) -> LearningDashboard {
        let state = &self.state;
        LearningDashboard {
            overview: DashboardOverview {
                stored_outcomes: state.outcomes.len(),
                open_outcomes: state.outcomes.open_count(),
                tracked_bots: state.bots.len(),
                tracked_signals: state.signals.len(),
                pattern_count: state.patterns.len(),
                feedback_count: state.feedback.len(),
                counters: state.counters.snapshot(),
            },
            metrics: LearningMetrics::clone(&state.metrics.current()),
            portfolio: state.portfolio.current(),
            top_bots: state.bots.top(DASHBOARD_TOP_BOTS),
            settings: AdaptiveSettings::clone(&state.settings.current()),
            models: state.models.models(),
            recent_insights: state.insights.recent(DASHBOARD_INSIGHTS),
        }
    }

    // ---- Predictions ----

    pub fn predict_portfolio_risk(&self, portfolio: &PortfolioSnapshot) -> RiskPrediction {
        let history = self.state.outcomes.all();
        self.state.predictor.predict_portfolio_risk(portfolio, &history, current_timestamp_millis())
    }

    pub fn predict_position_risk(
        &self,
        position: &PositionSnapshot,
        portfolio: &PortfolioSnapshot,
    ) -> RiskPrediction {
        let history = self.state.outcomes.for_symbol(&position.symbol);
        self.state.predictor.predict_position_risk(position, portfolio, &history, current_timestamp_millis())
    }

    pub fn predict_return(&self, symbol: &str, horizon: PredictionHorizon) -> Option<ReturnPrediction> {
        let history = self.state.outcomes.for_symbol(symbol);
        self.state.predictor.predict_return(symbol, horizon, &history, current_timestamp_millis())
    }

    // ---- Snapshots ----

    pub fn export_snapshot(&self) -> EngineSnapshot {
        let state = &self.state;
        EngineSnapshot {
            exported_at: current_timestamp_millis(),
            outcomes: state.outcomes.all(),
            bots: state.bots.all(),
            signals: state.signals.all(),
            settings: AdaptiveSettings::clone(&state.settings.current()),
            patterns: state.patterns.patterns(None),
            feedback: state.feedback.all(),
            models: state.models.models(),
            portfolio: state.portfolio.current(),
            metrics: LearningMetrics::clone(&state.metrics.current()),
        }
    }

    /// Load a previously exported snapshot into this engine
    pub fn restore(&self, snapshot: EngineSnapshot) {
        let state = &self.state;
        info!(
            "Restoring snapshot from {}: {} outcomes, {} bots, {} signals",
            snapshot.exported_at,
            snapshot.outcomes.len(),
            snapshot.bots.len(),
            snapshot.signals.len()
        );
        state.outcomes.restore(snapshot.outcomes);
        state.bots.restore(snapshot.bots);
        state.signals.restore(snapshot.signals);
        state.settings.restore(snapshot.settings);
        state.patterns.restore(snapshot.patterns);
        state.feedback.restore(snapshot.feedback);
        state.models.restore(snapshot.models);
        state.portfolio.restore(snapshot.portfolio);
        state.metrics.restore(snapshot.metrics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MockEventSink, NullSink, TradeClosed, TradeExecuted};
    use crate::learning::feedback::FeedbackType;
    use serde_json::json;

    fn engine() -> LearningEngine {
        LearningEngine::new(LearningConfig::default(), Arc::new(NullSink))
    }

    fn open(id: &str, symbol: &str, bot: &str) -> InboundEvent {
        InboundEvent::TradeExecuted(TradeExecuted {
            trade_id: Some(id.into()),
            symbol: Some(symbol.into()),
            side: Some(crate::utils::types::Side::Buy),
            price: Some(100.0),
            quantity: Some(1.0),
            bot_id: Some(bot.into()),
            ..Default::default()
        })
    }

    fn close(id: &str, pnl: f64) -> InboundEvent {
        InboundEvent::TradeClosed(TradeClosed {
            trade_id: Some(id.into()),
            realized_pnl: Some(pnl),
            ..Default::default()
        })
    }

    #[test]
    fn test_resolved_trade_publishes_outcome() {
        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(|event| matches!(event, LearningEvent::OutcomeProcessed { outcome, .. } if outcome.trade_id == "t1"))
            .times(1)
            .return_const(());
        let engine = LearningEngine::new(LearningConfig::default(), Arc::new(sink));

        assert!(engine.handle(open("t1", "AAPL", "B1")));
        assert!(engine.handle(close("t1", 12.0)));
        // Re-delivery is absorbed without a second publication
        assert!(engine.handle(close("t1", 12.0)));

        assert_eq!(engine.bot_performance("B1").total_trades, 1);
        assert_eq!(engine.portfolio_learning().closed_trades, 1);
    }

    #[test]
    fn test_missing_trade_id_is_skipped() {
        let engine = engine();
        assert!(!engine.handle(InboundEvent::TradeExecuted(TradeExecuted::default())));
        assert!(!engine.handle_json("{not json"));
        let counters = engine.state().counters.snapshot();
        assert_eq!(counters.events_skipped, 2);
        assert!(engine.recent_outcomes(10).is_empty());
    }

    #[test]
    fn test_feedback_publishes_and_tightens() {
        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(|event| event.name() == "learning.feedback_processed")
            .times(1)
            .return_const(());
        let engine = LearningEngine::new(LearningConfig::default(), Arc::new(sink));

        let record = engine.process_feedback(FeedbackInput::new(
            FeedbackType::RiskAdjustment,
            json!({"severity": "critical"}),
        ));
        assert_eq!(record.impact, crate::learning::FeedbackImpact::High);

        let settings = engine.adaptive_settings();
        assert!((settings.risk_multiplier - 0.85).abs() < 1e-12);
        assert!((settings.confidence_threshold - 0.65).abs() < 1e-12);
        assert_eq!(engine.recent_feedback(5).len(), 1);
    }

    #[test]
    fn test_performance_feedback_leaves_settings() {
        let engine = engine();
        for i in 0..30 {
            let id = format!("t{}", i);
            engine.handle(open(&id, "AAPL", "B1"));
            engine.handle(close(&id, if i % 4 == 3 { -1.0 } else { 1.0 }));
        }
        for _ in 0..60 {
            engine.process_feedback(FeedbackInput::new(FeedbackType::PerformanceUpdate, json!({})));
        }
        let settings = engine.adaptive_settings();
        assert_eq!(settings.risk_multiplier, 1.0);
        assert_eq!(settings.confidence_threshold, 0.6);
        assert_eq!(settings.bot_weight("B1"), engine.bot_performance("B1").confidence_weight);

        engine.process_feedback(FeedbackInput::new(
            FeedbackType::RiskAdjustment,
            json!({"severity": "critical"}),
        ));
        let settings = engine.adaptive_settings();
        assert!((settings.risk_multiplier - 0.85).abs() < 1e-12);
        assert!((settings.confidence_threshold - 0.65).abs() < 1e-12);

        // Scheduled reconciliation still applies the win-rate nudge, once per pass
        let settings = engine.reconcile_settings();
        assert!((settings.risk_multiplier - 0.85 * 1.02).abs() < 1e-12);
        assert!((settings.confidence_threshold - 0.64).abs() < 1e-12);
    }

    #[test]
    fn test_signal_outcomes_produce_insight() {
        let engine = engine();
        for _ in 0..5 {
            engine.handle(InboundEvent::SignalOutcome(SignalOutcome {
                signal_type: Some("rsi".into()),
                source: Some("ta".into()),
                was_correct: Some(true),
                ..Default::default()
            }));
        }
        let insights = engine.recent_insights(5);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, crate::learning::InsightKind::SignalEffectiveness);
        assert!((engine.signal_effectiveness("rsi", "ta").weight_multiplier - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_signal_feedback_updates_tracker() {
        let engine = engine();
        engine.process_feedback(FeedbackInput::new(
            FeedbackType::SignalAccuracy,
            json!({"signal_type": "rsi", "source": "ta", "was_correct": true}),
        ));
        assert_eq!(engine.signal_effectiveness("rsi", "ta").total_signals, 1);
        assert_eq!(engine.adaptive_settings().confidence_threshold, 0.6);
    }

    #[test]
    fn test_low_confidence_decision_creates_insight() {
        let engine = engine();
        engine.handle(InboundEvent::BotDecision(BotDecision {
            bot_id: Some("B1".into()),
            confidence: Some(0.3),
            ..Default::default()
        }));
        assert_eq!(engine.recent_insights(5).len(), 1);
        assert_eq!(engine.bot_performance("B1").decisions_made, 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let source = engine();
        for i in 0..5 {
            let id = format!("t{}", i);
            source.handle(open(&id, "AAPL", "B1"));
            source.handle(close(&id, 1.0));
        }
        let snapshot = source.export_snapshot();
        let encoded = serde_json::to_string(&snapshot).unwrap();

        let target = engine();
        target.restore(serde_json::from_str(&encoded).unwrap());
        assert_eq!(target.recent_outcomes(10).len(), 5);
        assert_eq!(target.bot_performance("B1").total_trades, 5);
        assert_eq!(target.portfolio_learning().closed_trades, 5);
    }

    #[tokio::test]
    async fn test_run_inbound_drains_queue() {
        let engine = engine();
        let (tx, rx) = crate::events::inbound_channel(16);
        assert!(tx.send(open("t1", "AAPL", "B1")).await);
        assert!(tx.send(close("t1", -3.0)).await);
        drop(tx);

        assert_eq!(engine.run_inbound(rx).await, 2);
        assert_eq!(engine.portfolio_learning().current_streak, -1);
    }
}
