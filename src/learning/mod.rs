//! Learning Module
//!
//! Outcome storage, performance trackers, pattern mining, prediction,
//! feedback handling and the adaptive settings derived from them.

pub mod aggregator;
pub mod batch;
pub mod bot_tracker;
pub mod engine;
pub mod feedback;
pub mod insights;
pub mod models;
pub mod outcome_store;
pub mod patterns;
pub mod portfolio;
pub mod predictor;
pub mod rolling;
pub mod scheduler;
pub mod settings;
pub mod signal_tracker;

pub use aggregator::{compute_metrics, DataQuality, LearningMetrics, MetricsAggregator};
pub use batch::{BatchGuard, SkipReason};
pub use bot_tracker::{BotPerformance, BotTracker, BotUpdate};
pub use engine::{DashboardOverview, EngineSnapshot, LearningDashboard, LearningEngine};
pub use feedback::{
    assess_impact, FeedbackAction, FeedbackImpact, FeedbackInput, FeedbackLog, FeedbackLoop, FeedbackType,
};
pub use insights::{Insight, InsightKind, InsightLevel, InsightLog};
pub use models::{ModelKind, ModelRegistry, PredictiveModel};
pub use outcome_store::{CloseResult, OutcomeClass, OutcomeStore, TradeOutcome, UNKNOWN_SYMBOL};
pub use patterns::{
    detect_patterns, pattern_confidence, AnalysisOutcome, PatternAnalyzer, PatternCondition, PatternMatch,
    PatternStrength, PatternType, Timeframe,
};
pub use portfolio::{PortfolioLearning, PortfolioTracker, PortfolioUpdate};
pub use predictor::{Predictor, ReturnPrediction, RiskFactor, RiskLevel, RiskPrediction};
pub use scheduler::{LearningScheduler, ScheduledJob};
pub use settings::{AdaptiveSettings, AdaptiveSettingsStore, Reconciliation};
pub use signal_tracker::{signal_key, SignalEffectiveness, SignalTracker, SignalUpdate};
