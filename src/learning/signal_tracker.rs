//! Signal Effectiveness Tracker
//!
//! Rolling correctness per (signal type, source) pair and the derived weight
//! multiplier.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

use super::rolling::{push_bounded, step_weight, window_score};
use crate::config::TrackerConfig;

const NEUTRAL_EFFECTIVENESS: f64 = 0.5;
const NEUTRAL_MULTIPLIER: f64 = 1.0;

/// Key used in the adaptive settings signal-weight map.
/// `:` and `\` inside either part are backslash-escaped so distinct pairs
/// `:` and `\\` inside either part are backslash-escaped so distinct pairs
/// never share a key.
pub fn signal_key(signal_type: &str, source: &str) -> String {
    format!("{}:{}", escape_key_part(signal_type), escape_key_part(source))
}

fn escape_key_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        if c == ':' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

type PairKey = (String, String);

fn pair_key(signal_type: &str, source: &str) -> PairKey {
    (signal_type.to_string(), source.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEffectiveness {
    pub signal_type: String,
    pub source: String,
    pub total_signals: u64,
    pub successful_predictions: u64,
    /// Correct ratio over the recent window
    pub effectiveness_score: f64,
    pub weight_multiplier: f64,
    pub avg_strength: f64,
    #[serde(default)]
    pub strength_samples: u64,
    pub recent_outcomes: VecDeque<bool>,
    pub last_updated: i64,
}

impl SignalEffectiveness {
    pub fn neutral(signal_type: &str, source: &str) -> Self {
        Self {
            signal_type: signal_type.to_string(),
            source: source.to_string(),
            total_signals: 0,
            successful_predictions: 0,
            effectiveness_score: NEUTRAL_EFFECTIVENESS,
            weight_multiplier: NEUTRAL_MULTIPLIER,
            avg_strength: 0.0,
            strength_samples: 0,
            recent_outcomes: VecDeque::new(),
            last_updated: 0,
        }
    }

    pub fn key(&self) -> String {
        signal_key(&self.signal_type, &self.source)
    }
}

/// Multiplier change produced by one update
#[derive(Debug, Clone)]
pub struct SignalUpdate {
    pub previous_multiplier: f64,
    pub signal: SignalEffectiveness,
}

impl SignalUpdate {
    pub fn multiplier_delta(&self) -> f64 {
        self.signal.weight_multiplier - self.previous_multiplier
    }
}

pub struct SignalTracker {
    config: TrackerConfig,
    signals: DashMap<PairKey, SignalEffectiveness>,
}

impl SignalTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            signals: DashMap::new(),
        }
    }

    pub fn update(
        &self,
        signal_type: &str,
        source: &str,
        correct: bool,
        strength: Option<f64>,
        now: i64,
    ) -> SignalUpdate {
        let mut entry = self.signals
            .entry(pair_key(signal_type, source))
            .or_insert_with(|| SignalEffectiveness::neutral(signal_type, source));
        let signal = entry.value_mut();
        let previous = signal.weight_multiplier;

        signal.total_signals += 1;
        if correct {
            signal.successful_predictions += 1;
        }
        if let Some(s) = strength.filter(|s| s.is_finite()) {
            signal.strength_samples += 1;
            signal.avg_strength += (s - signal.avg_strength) / signal.strength_samples as f64;
        }

        push_bounded(&mut signal.recent_outcomes, correct, self.config.window);
        signal.effectiveness_score = window_score(&signal.recent_outcomes, NEUTRAL_EFFECTIVENESS);
        signal.weight_multiplier = step_weight(
            signal.weight_multiplier,
            signal.effectiveness_score,
            signal.recent_outcomes.len(),
            &self.config,
        );
        signal.last_updated = now;

        debug!(
            "Signal {}:{} updated: effectiveness {:.3}, multiplier {:.2} -> {:.2}",
            signal_type, source, signal.effectiveness_score, previous, signal.weight_multiplier
        );

        SignalUpdate {
            previous_multiplier: previous,
            signal: signal.clone(),
        }
    }

    /// Current snapshot, or the neutral record for an unseen pair
    pub fn get(&self, signal_type: &str, source: &str) -> SignalEffectiveness {
        self.signals
            .get(&pair_key(signal_type, source))
            .map(|s| s.clone())
            .unwrap_or_else(|| SignalEffectiveness::neutral(signal_type, source))
    }

    /// Every tracked source for one signal type
    pub fn by_type(&self, signal_type: &str) -> Vec<SignalEffectiveness> {
        let mut found: Vec<_> = self.signals.iter()
            .filter(|e| e.value().signal_type == signal_type)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.source.cmp(&b.source));
        found
    }

    pub fn all(&self) -> Vec<SignalEffectiveness> {
        let mut found: Vec<_> = self.signals.iter().map(|e| e.value().clone()).collect();
        found.sort_by(|a, b| (&a.signal_type, &a.source).cmp(&(&b.signal_type, &b.source)));
        found
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.signals.iter()
            .map(|e| (e.value().key(), e.value().weight_multiplier))
            .collect()
    }

    pub fn restore(&self, signals: Vec<SignalEffectiveness>) {
        for signal in signals {
            self.signals.insert(pair_key(&signal.signal_type, &signal.source), signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unseen_signal_is_neutral() {
        let tracker = SignalTracker::new(TrackerConfig::signal_defaults());
        let signal = tracker.get("rsi", "ta");
        assert_eq!(signal.effectiveness_score, 0.5);
        assert_eq!(signal.weight_multiplier, 1.0);
    }

    #[test]
    fn test_wrong_signals_degrade_multiplier() {
        let tracker = SignalTracker::new(TrackerConfig::signal_defaults());
        let mut last = None;
        for i in 0..8 {
            last = Some(tracker.update("rsi", "ta", false, Some(0.8), i));
        }
        let update = last.unwrap();
        assert!((update.multiplier_delta() + 0.1).abs() < 1e-9);
        let signal = update.signal;
        assert_eq!(signal.effectiveness_score, 0.0);
        assert!((signal.weight_multiplier - 0.6).abs() < 1e-9);
        assert!((signal.avg_strength - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_sources_tracked_separately() {
        let tracker = SignalTracker::new(TrackerConfig::signal_defaults());
        tracker.update("macd", "alpha", true, None, 0);
        tracker.update("macd", "beta", false, None, 0);
        tracker.update("rsi", "alpha", true, None, 0);

        let macd = tracker.by_type("macd");
        assert_eq!(macd.len(), 2);
        assert_eq!(macd[0].source, "alpha");
        assert_eq!(tracker.weights().len(), 3);
        assert!(tracker.weights().contains_key("macd:beta"));
    }

    #[test]
    fn test_separator_in_names_keeps_pairs_apart() {
        let tracker = SignalTracker::new(TrackerConfig::signal_defaults());
        for i in 0..3 {
            tracker.update("rsi:14", "ta", true, None, i);
        }
        tracker.update("rsi", "14:ta", false, None, 3);

        let first = tracker.get("rsi:14", "ta");
        let second = tracker.get("rsi", "14:ta");
        assert_eq!(first.total_signals, 3);
        assert_eq!(second.total_signals, 1);
        assert_eq!(second.signal_type, "rsi");
        assert_eq!(tracker.len(), 2);

        let weights = tracker.weights();
        assert_eq!(weights.len(), 2);
        assert_ne!(signal_key("rsi:14", "ta"), signal_key("rsi", "14:ta"));
        assert!(weights.contains_key(&signal_key("rsi", "14:ta")));
    }

    #[test]
    fn test_plain_key_format() {
        assert_eq!(signal_key("macd", "beta"), "macd:beta");
        assert_eq!(signal_key("a\\", "b"), "a\\\\:b");
    }

    proptest! {
        #[test]
        fn multiplier_always_within_bounds(outcomes in proptest::collection::vec(any::<bool>(), 0..300)) {
            let tracker = SignalTracker::new(TrackerConfig::signal_defaults());
            for (i, correct) in outcomes.iter().enumerate() {
                let signal = tracker.update("rsi", "ta", *correct, None, i as i64).signal;
                prop_assert!(signal.weight_multiplier >= 0.2 && signal.weight_multiplier <= 1.8);
                prop_assert!(signal.recent_outcomes.len() <= 50);
            }
        }
    }
}
