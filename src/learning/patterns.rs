//! Pattern Analyzer
//!
//! Mines the outcome store for statistically supported groupings:
//! - By symbol
//! - By hour of day (only when the rate is far from a coin flip)
//! - By signal type and signal severity
//!
//! Each pass is a fresh snapshot over the bounded store; detected patterns
//! overwrite entries with the same id and are never merged across runs.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::batch::{BatchGuard, SkipReason};
use super::outcome_store::{TradeOutcome, UNKNOWN_SYMBOL};
use crate::config::PatternConfig;
use crate::utils::helpers::{clamp, hour_of_day, mean};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    SignalAccuracy,
    TradeSuccess,
    RiskPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStrength {
    Weak,
    Moderate,
    Strong,
}

impl PatternStrength {
    pub fn from_confidence(confidence: f64, config: &PatternConfig) -> Self {
        if confidence > config.strong_confidence {
            PatternStrength::Strong
        } else if confidence >= config.moderate_confidence {
            PatternStrength::Moderate
        } else {
            PatternStrength::Weak
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
}

/// One matching condition of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
    pub weight: f64,
}

/// Window covered by the outcomes behind a pattern (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Deterministic from type and key, so re-detection overwrites
    pub id: String,
    pub pattern_type: PatternType,
    pub description: String,
    pub occurrences: usize,
    pub success_rate: f64,
    pub avg_return: Option<f64>,
    pub confidence: f64,
    pub timeframe: Timeframe,
    pub conditions: Vec<PatternCondition>,
    pub last_seen: i64,
    pub strength: PatternStrength,
}

/// Confidence grows with sample size (saturating) and with the distance of
/// the success rate from 0.5. A 50% rate yields zero rate confidence.
pub fn pattern_confidence(samples: usize, success_rate: f64, config: &PatternConfig) -> f64 {
    let saturation = config.saturation_samples.max(1) as f64;
    let sample_confidence = (samples as f64 / saturation).min(1.0);
    let rate_confidence = ((success_rate - 0.5).abs() * 2.0).min(1.0);
    clamp(0.3 * sample_confidence + 0.7 * rate_confidence, 0.0, 1.0)
}

/// Resolved outcomes sharing one grouping key
#[derive(Debug, Default)]
struct Group {
    resolved: usize,
    wins: usize,
    returns: Vec<f64>,
    first: Option<i64>,
    last: Option<i64>,
}

impl Group {
    fn add(&mut self, outcome: &TradeOutcome) {
        self.resolved += 1;
        if outcome.is_winner() {
            self.wins += 1;
        }
        if let Some(r) = outcome.return_pct {
            self.returns.push(r);
        }
        let seen = outcome.closed_at.unwrap_or(outcome.executed_at);
        self.first = Some(self.first.map_or(outcome.executed_at, |f| f.min(outcome.executed_at)));
        self.last = Some(self.last.map_or(seen, |l| l.max(seen)));
    }

    fn success_rate(&self) -> f64 {
        if self.resolved == 0 {
            return 0.0;
        }
        self.wins as f64 / self.resolved as f64
    }

    fn avg_return(&self) -> Option<f64> {
        if self.returns.is_empty() {
            None
        } else {
            Some(mean(&self.returns))
        }
    }

    fn timeframe(&self) -> Timeframe {
        Timeframe {
            start: self.first.unwrap_or_default(),
            end: self.last.unwrap_or_default(),
        }
    }
}

struct PatternDraft {
    id: String,
    pattern_type: PatternType,
    description: String,
    condition: PatternCondition,
}

fn materialize(draft: PatternDraft, group: &Group, config: &PatternConfig) -> PatternMatch {
    let success_rate = group.success_rate();
    let confidence = pattern_confidence(group.resolved, success_rate, config);
    let timeframe = group.timeframe();
    PatternMatch {
        id: draft.id,
        pattern_type: draft.pattern_type,
        description: draft.description,
        occurrences: group.resolved,
        success_rate,
        avg_return: group.avg_return(),
        confidence,
        timeframe,
        conditions: vec![draft.condition],
        last_seen: timeframe.end,
        strength: PatternStrength::from_confidence(confidence, config),
    }
}

fn condition(field: &str, operator: ConditionOperator, value: serde_json::Value) -> PatternCondition {
    PatternCondition {
        field: field.to_string(),
        operator,
        value,
        weight: 1.0,
    }
}

/// Detect patterns over `outcomes` without touching any stored state.
///
/// Returns `None` when the store is too small to analyze.
pub fn detect_patterns(outcomes: &[TradeOutcome], config: &PatternConfig) -> Option<Vec<PatternMatch>> {
    if outcomes.len() < config.min_total_outcomes {
        return None;
    }

    let mut by_symbol: BTreeMap<&str, Group> = BTreeMap::new();
    let mut by_hour: BTreeMap<u32, Group> = BTreeMap::new();
    let mut by_signal_type: BTreeMap<&str, Group> = BTreeMap::new();
    let mut by_severity: BTreeMap<&'static str, Group> = BTreeMap::new();

    for outcome in outcomes.iter().filter(|o| o.is_resolved()) {
        if outcome.symbol != UNKNOWN_SYMBOL {
            by_symbol.entry(outcome.symbol.as_str()).or_default().add(outcome);
        }
        if let Some(hour) = hour_of_day(outcome.executed_at) {
            by_hour.entry(hour).or_default().add(outcome);
        }
        // A trade counts once per distinct type or severity
        let types: BTreeSet<&str> = outcome.signals.iter()
            .filter_map(|s| s.signal_type.as_deref())
            .collect();
        for signal_type in types {
            by_signal_type.entry(signal_type).or_default().add(outcome);
        }
        let severities: BTreeSet<&'static str> = outcome.signals.iter()
            .filter_map(|s| s.severity.map(|sev| sev.as_str()))
            .collect();
        for severity in severities {
            by_severity.entry(severity).or_default().add(outcome);
        }
    }

    let mut patterns = Vec::new();

    for (symbol, group) in &by_symbol {
        if group.resolved < config.symbol_min_samples {
            continue;
        }
        let draft = PatternDraft {
            id: format!("symbol:{}", symbol),
            pattern_type: PatternType::TradeSuccess,
            description: format!(
                "{} trades succeed {:.0}% of the time (n={})",
                symbol,
                group.success_rate() * 100.0,
                group.resolved
            ),
            condition: condition("symbol", ConditionOperator::Equals, serde_json::json!(symbol)),
        };
        patterns.push(materialize(draft, group, config));
    }

    for (hour, group) in &by_hour {
        let rate = group.success_rate();
        let near_coin_flip = rate >= config.neutral_band_low && rate <= config.neutral_band_high;
        if group.resolved < config.time_bucket_min_samples || near_coin_flip {
            continue;
        }
        let draft = PatternDraft {
            id: format!("hour:{:02}", hour),
            pattern_type: PatternType::TradeSuccess,
            description: format!(
                "Trades opened at {:02}:00 UTC {} {:.0}% of the time (n={})",
                hour,
                if rate > 0.5 { "succeed" } else { "succeed only" },
                rate * 100.0,
                group.resolved
            ),
            condition: condition("hour_of_day", ConditionOperator::Equals, serde_json::json!(hour)),
        };
        patterns.push(materialize(draft, group, config));
    }

    for (signal_type, group) in &by_signal_type {
        if group.resolved < config.signal_type_min_samples {
            continue;
        }
        let draft = PatternDraft {
            id: format!("signal_type:{}", signal_type),
            pattern_type: PatternType::SignalAccuracy,
            description: format!(
                "Trades backed by {} signals succeed {:.0}% of the time (n={})",
                signal_type,
                group.success_rate() * 100.0,
                group.resolved
            ),
            condition: condition("signal_type", ConditionOperator::Contains, serde_json::json!(signal_type)),
        };
        patterns.push(materialize(draft, group, config));
    }

    for (severity, group) in &by_severity {
        if group.resolved < config.severity_min_samples {
            continue;
        }
        let draft = PatternDraft {
            id: format!("severity:{}", severity),
            pattern_type: PatternType::RiskPattern,
            description: format!(
                "Trades on {}-severity signals succeed {:.0}% of the time (n={})",
                severity,
                group.success_rate() * 100.0,
                group.resolved
            ),
            condition: condition("signal_severity", ConditionOperator::Contains, serde_json::json!(severity)),
        };
        patterns.push(materialize(draft, group, config));
    }

    Some(patterns)
}

/// Result of one analysis trigger
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed {
        detected: Vec<String>,
        table_size: usize,
    },
    Skipped(SkipReason),
}

/// Owns the published pattern table
pub struct PatternAnalyzer {
    config: PatternConfig,
    table: ArcSwap<HashMap<String, PatternMatch>>,
    guard: BatchGuard,
}

impl PatternAnalyzer {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            table: ArcSwap::from_pointee(HashMap::new()),
            guard: BatchGuard::new("pattern analysis"),
        }
    }

    /// Run one detection pass and publish the merged table in one step
    pub fn analyze(&self, outcomes: &[TradeOutcome]) -> AnalysisOutcome {
        let result = self.guard.try_run(|| {
            let Some(detected) = detect_patterns(outcomes, &self.config) else {
                info!(
                    "Pattern analysis skipped: {} outcomes, {} required",
                    outcomes.len(),
                    self.config.min_total_outcomes
                );
                return AnalysisOutcome::Skipped(SkipReason::InsufficientData {
                    available: outcomes.len(),
                    required: self.config.min_total_outcomes,
                });
            };

            let mut table = HashMap::clone(&self.table.load());
            let ids: Vec<String> = detected.iter().map(|p| p.id.clone()).collect();
            for pattern in detected {
                debug!("Pattern {}: {}", pattern.id, pattern.description);
                table.insert(pattern.id.clone(), pattern);
            }
            let table_size = table.len();
            self.table.store(Arc::new(table));

            info!("Pattern analysis complete: {} detected, {} stored", ids.len(), table_size);
            AnalysisOutcome::Completed { detected: ids, table_size }
        });

        result.unwrap_or_else(AnalysisOutcome::Skipped)
    }

    /// Patterns sorted by confidence, optionally filtered by type
    pub fn patterns(&self, pattern_type: Option<PatternType>) -> Vec<PatternMatch> {
        let table = self.table.load();
        let mut patterns: Vec<_> = table.values()
            .filter(|p| pattern_type.map_or(true, |t| p.pattern_type == t))
            .cloned()
            .collect();
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(a.id.cmp(&b.id)));
        patterns
    }

    pub fn get(&self, id: &str) -> Option<PatternMatch> {
        self.table.load().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn restore(&self, patterns: Vec<PatternMatch>) {
        let table = patterns.into_iter().map(|p| (p.id.clone(), p)).collect();
        self.table.store(Arc::new(table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SignalRef;
    use crate::learning::outcome_store::OutcomeClass;
    use crate::utils::types::Severity;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn outcome(id: usize, symbol: &str, win: bool, executed_at: i64) -> TradeOutcome {
        let pnl = if win { 10.0 } else { -10.0 };
        TradeOutcome {
            trade_id: format!("t{}", id),
            symbol: symbol.to_string(),
            side: None,
            entry_price: Some(100.0),
            exit_price: None,
            quantity: Some(1.0),
            pnl: Some(pnl),
            return_pct: Some(pnl / 100.0),
            holding_period_ms: None,
            outcome: if win { OutcomeClass::Win } else { OutcomeClass::Loss },
            executed_at,
            closed_at: Some(executed_at + 1_000),
            signals: Vec::new(),
            bot_id: None,
            entry_confidence: None,
            exit_reason: None,
            max_adverse: None,
            max_favorable: None,
        }
    }

    /// Symbols spread over hours so every hour bucket holds a balanced mix
    fn dataset() -> Vec<TradeOutcome> {
        let mut outcomes = Vec::new();
        let mut id = 0;
        for (symbol, wins) in [("SYMBOL_X", 18), ("SYMBOL_Y", 10), ("SYMBOL_Z", 2)] {
            for i in 0..20 {
                let hour = (i % 4) as i64;
                outcomes.push(outcome(id, symbol, i < wins, hour * HOUR_MS));
                id += 1;
            }
        }
        outcomes
    }

    #[test]
    fn test_confidence_zero_rate_component_at_coin_flip() {
        let config = PatternConfig::default();
        assert!((pattern_confidence(100, 0.5, &config) - 0.3).abs() < 1e-12);
        assert!((pattern_confidence(1_000, 0.5, &config) - 0.3).abs() < 1e-12);
        assert!(pattern_confidence(20, 0.9, &config) > pattern_confidence(20, 0.7, &config));
        assert!(pattern_confidence(80, 0.9, &config) > pattern_confidence(20, 0.9, &config));
    }

    #[test]
    fn test_strength_buckets() {
        let config = PatternConfig::default();
        assert_eq!(PatternStrength::from_confidence(0.59, &config), PatternStrength::Weak);
        assert_eq!(PatternStrength::from_confidence(0.6, &config), PatternStrength::Moderate);
        assert_eq!(PatternStrength::from_confidence(0.8, &config), PatternStrength::Moderate);
        assert_eq!(PatternStrength::from_confidence(0.81, &config), PatternStrength::Strong);
    }

    #[test]
    fn test_skips_small_store() {
        let analyzer = PatternAnalyzer::new(PatternConfig::default());
        let outcomes: Vec<_> = dataset().into_iter().take(49).collect();
        let result = analyzer.analyze(&outcomes);
        assert_eq!(
            result,
            AnalysisOutcome::Skipped(SkipReason::InsufficientData { available: 49, required: 50 })
        );
        assert!(analyzer.is_empty());
    }

    #[test]
    fn test_symbol_patterns() {
        let analyzer = PatternAnalyzer::new(PatternConfig::default());
        analyzer.analyze(&dataset());

        let x = analyzer.get("symbol:SYMBOL_X").unwrap();
        assert_eq!(x.occurrences, 20);
        assert!((x.success_rate - 0.9).abs() < 1e-12);
        assert!(x.strength >= PatternStrength::Moderate);
        assert!((x.avg_return.unwrap() - 0.08).abs() < 1e-9);

        let y = analyzer.get("symbol:SYMBOL_Y").unwrap();
        assert_eq!(y.strength, PatternStrength::Weak);
    }

    #[test]
    fn test_neutral_hour_buckets_not_materialized() {
        let analyzer = PatternAnalyzer::new(PatternConfig::default());
        analyzer.analyze(&dataset());

        for pattern in analyzer.patterns(Some(PatternType::TradeSuccess)) {
            if pattern.id.starts_with("hour:") {
                assert!(pattern.success_rate < 0.4 || pattern.success_rate > 0.6);
            }
        }
    }

    #[test]
    fn test_skewed_hour_bucket_materialized() {
        let mut outcomes = dataset();
        for i in 0..10 {
            outcomes.push(outcome(100 + i, "SYMBOL_W", false, 9 * HOUR_MS));
        }
        let patterns = detect_patterns(&outcomes, &PatternConfig::default()).unwrap();
        let hour = patterns.iter().find(|p| p.id == "hour:09").unwrap();
        assert_eq!(hour.success_rate, 0.0);
        assert_eq!(hour.conditions[0].value, serde_json::json!(9));
    }

    #[test]
    fn test_signal_type_and_severity_patterns() {
        let mut outcomes = dataset();
        for o in outcomes.iter_mut().filter(|o| o.symbol == "SYMBOL_X") {
            o.signals = vec![
                SignalRef { id: "a".into(), signal_type: Some("breakout".into()), severity: Some(Severity::High) },
                SignalRef { id: "b".into(), signal_type: Some("breakout".into()), severity: None },
            ];
        }
        let patterns = detect_patterns(&outcomes, &PatternConfig::default()).unwrap();

        let signal = patterns.iter().find(|p| p.id == "signal_type:breakout").unwrap();
        assert_eq!(signal.pattern_type, PatternType::SignalAccuracy);
        assert_eq!(signal.occurrences, 20);

        let severity = patterns.iter().find(|p| p.id == "severity:high").unwrap();
        assert_eq!(severity.pattern_type, PatternType::RiskPattern);
    }

    #[test]
    fn test_rerun_overwrites_instead_of_duplicating() {
        let analyzer = PatternAnalyzer::new(PatternConfig::default());
        analyzer.analyze(&dataset());
        let first = analyzer.len();

        let mut outcomes = dataset();
        for o in outcomes.iter_mut().filter(|o| o.symbol == "SYMBOL_Y") {
            o.outcome = OutcomeClass::Win;
            o.pnl = Some(10.0);
        }
        analyzer.analyze(&outcomes);

        assert_eq!(analyzer.len(), first);
        assert_eq!(analyzer.get("symbol:SYMBOL_Y").unwrap().success_rate, 1.0);
    }
}
