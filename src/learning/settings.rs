//! Adaptive Settings Store
//!
//! The settings other components read (risk multiplier, confidence threshold,
//! bot and signal weights) live behind an `ArcSwap`. Readers load a complete
//! snapshot; writers compute a new value from the current one and publish it
//! in one step, so no reader ever sees a half-applied change.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::outcome_store::TradeOutcome;
use crate::config::{SettingsConfig, TrackerConfig};
use crate::utils::helpers::{clamp, ratio_of};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub risk_multiplier: f64,
    pub confidence_threshold: f64,
    /// Keyed by `signal_key(type, source)`
    pub signal_weights: BTreeMap<String, f64>,
    pub bot_weights: BTreeMap<String, f64>,
    /// 0 until the first update
    pub version: u64,
    pub last_updated: i64,
}

impl AdaptiveSettings {
    pub fn initial(config: &SettingsConfig) -> Self {
        Self {
            risk_multiplier: config.default_risk_multiplier,
            confidence_threshold: config.default_confidence_threshold,
            signal_weights: BTreeMap::new(),
            bot_weights: BTreeMap::new(),
            version: 0,
            last_updated: 0,
        }
    }

    pub fn bot_weight(&self, bot_id: &str) -> f64 {
        self.bot_weights.get(bot_id).copied().unwrap_or(1.0)
    }

    pub fn signal_weight(&self, key: &str) -> f64 {
        self.signal_weights.get(key).copied().unwrap_or(1.0)
    }
}

/// What a reconciliation pass did
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Recent win rate and sample count, when enough history existed
    pub recent_performance: Option<(f64, usize)>,
    pub settings: Arc<AdaptiveSettings>,
}

pub struct AdaptiveSettingsStore {
    config: SettingsConfig,
    bot_bounds: (f64, f64),
    signal_bounds: (f64, f64),
    current: ArcSwap<AdaptiveSettings>,
}

impl AdaptiveSettingsStore {
    pub fn new(config: SettingsConfig, bots: &TrackerConfig, signals: &TrackerConfig) -> Self {
        let initial = AdaptiveSettings::initial(&config);
        Self {
            config,
            bot_bounds: (bots.min_weight, bots.max_weight),
            signal_bounds: (signals.min_weight, signals.max_weight),
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn current(&self) -> Arc<AdaptiveSettings> {
        self.current.load_full()
    }

    fn clamp_all(&self, settings: &mut AdaptiveSettings) {
        let c = &self.config;
        settings.risk_multiplier = clamp(settings.risk_multiplier, c.min_risk_multiplier, c.max_risk_multiplier);
        settings.confidence_threshold = clamp(
            settings.confidence_threshold,
            c.min_confidence_threshold,
            c.max_confidence_threshold,
        );
        for weight in settings.bot_weights.values_mut() {
            *weight = clamp(*weight, self.bot_bounds.0, self.bot_bounds.1);
        }
        for weight in settings.signal_weights.values_mut() {
            *weight = clamp(*weight, self.signal_bounds.0, self.signal_bounds.1);
        }
    }

    /// Apply a pure transform to the current settings and publish the result.
    ///
    /// `f` may run more than once under contention.
    pub fn update(&self, now: i64, f: impl Fn(&mut AdaptiveSettings)) -> Arc<AdaptiveSettings> {
        let mut published = None;
        self.current.rcu(|current| {
            let mut next = AdaptiveSettings::clone(current);
            f(&mut next);
            self.clamp_all(&mut next);
            next.version = current.version + 1;
            next.last_updated = now;
            let next = Arc::new(next);
            published = Some(Arc::clone(&next));
            next
        });
        published.unwrap_or_else(|| self.current.load_full())
    }

    /// Scale the risk multiplier and shift the confidence threshold
    pub fn adjust_risk(&self, risk_factor: f64, threshold_delta: f64, now: i64) -> Arc<AdaptiveSettings> {
        let settings = self.update(now, |s| {
            s.risk_multiplier *= risk_factor;
            s.confidence_threshold += threshold_delta;
        });
        debug!(
            "Risk adjusted: multiplier {:.3}, threshold {:.3}",
            settings.risk_multiplier, settings.confidence_threshold
        );
        settings
    }

    pub fn shift_threshold(&self, delta: f64, now: i64) -> Arc<AdaptiveSettings> {
        self.update(now, |s| s.confidence_threshold += delta)
    }

    /// Copy tracker weights without touching the risk multiplier or threshold
    pub fn sync_weights(
        &self,
        bot_weights: BTreeMap<String, f64>,
        signal_weights: BTreeMap<String, f64>,
        now: i64,
    ) -> Arc<AdaptiveSettings> {
        let settings = self.update(now, |s| {
            s.bot_weights = bot_weights.clone();
            s.signal_weights = signal_weights.clone();
        });
        debug!(
            "Weights synced (v{}): {} bots, {} signals",
            settings.version,
            settings.bot_weights.len(),
            settings.signal_weights.len()
        );
        settings
    }

    /// Copy tracker weights and nudge global settings from recent results.
    ///
    /// The nudge compounds, so this runs on the reconciliation schedule only.
    ///
    /// `recent` holds the newest stored outcomes; only resolved ones count.
    pub fn reconcile(
        &self,
        bot_weights: BTreeMap<String, f64>,
        signal_weights: BTreeMap<String, f64>,
        recent: &[TradeOutcome],
        now: i64,
    ) -> Reconciliation {
        let wins: Vec<bool> = recent.iter()
            .filter(|o| o.is_resolved())
            .map(TradeOutcome::is_winner)
            .collect();
        let recent_performance = ratio_of(wins.iter())
            .map(|rate| (rate, wins.len()))
            .filter(|(_, n)| *n >= self.config.reconcile_min_samples);

        let settings = self.update(now, |s| {
            s.bot_weights = bot_weights.clone();
            s.signal_weights = signal_weights.clone();
            match recent_performance {
                Some((rate, _)) if rate > 0.6 => {
                    s.risk_multiplier *= 1.02;
                    s.confidence_threshold -= 0.01;
                }
                Some((rate, _)) if rate < 0.4 => {
                    s.risk_multiplier *= 0.95;
                    s.confidence_threshold += 0.02;
                }
                _ => {}
            }
        });

        info!(
            "Settings reconciled (v{}): risk {:.3}, threshold {:.3}, {} bots, {} signals",
            settings.version,
            settings.risk_multiplier,
            settings.confidence_threshold,
            settings.bot_weights.len(),
            settings.signal_weights.len()
        );

        Reconciliation {
            recent_performance,
            settings,
        }
    }

    /// Replace the published settings, re-applying bounds
    pub fn restore(&self, mut settings: AdaptiveSettings) {
        self.clamp_all(&mut settings);
        self.current.store(Arc::new(settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::outcome_store::OutcomeClass;
    use proptest::prelude::*;

    fn store() -> AdaptiveSettingsStore {
        AdaptiveSettingsStore::new(
            SettingsConfig::default(),
            &TrackerConfig::default(),
            &TrackerConfig::signal_defaults(),
        )
    }

    fn outcomes(wins: usize, losses: usize) -> Vec<TradeOutcome> {
        (0..wins + losses)
            .map(|i| {
                let pnl = if i < wins { 1.0 } else { -1.0 };
                TradeOutcome {
                    trade_id: format!("t{}", i),
                    symbol: "AAPL".into(),
                    side: None,
                    entry_price: None,
                    exit_price: None,
                    quantity: None,
                    pnl: Some(pnl),
                    return_pct: None,
                    holding_period_ms: None,
                    outcome: OutcomeClass::from_pnl(Some(pnl)),
                    executed_at: i as i64,
                    closed_at: None,
                    signals: Vec::new(),
                    bot_id: None,
                    entry_confidence: None,
                    exit_reason: None,
                    max_adverse: None,
                    max_favorable: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_initial_settings() {
        let settings = store().current();
        assert_eq!(settings.risk_multiplier, 1.0);
        assert_eq!(settings.confidence_threshold, 0.6);
        assert_eq!(settings.version, 0);
    }

    #[test]
    fn test_update_bumps_version_and_clamps() {
        let store = store();
        let settings = store.update(5, |s| {
            s.risk_multiplier = 10.0;
            s.confidence_threshold = 0.1;
            s.bot_weights.insert("B1".into(), 3.0);
            s.signal_weights.insert("rsi:ta".into(), 0.0);
        });
        assert_eq!(settings.version, 1);
        assert_eq!(settings.last_updated, 5);
        assert_eq!(settings.risk_multiplier, 2.0);
        assert_eq!(settings.confidence_threshold, 0.4);
        assert_eq!(settings.bot_weight("B1"), 1.5);
        assert_eq!(settings.signal_weight("rsi:ta"), 0.2);
        assert_eq!(store.current().version, 1);
    }

    #[test]
    fn test_sync_weights_leaves_globals() {
        let store = store();
        let mut bots = BTreeMap::new();
        bots.insert("B1".to_string(), 1.25);
        for i in 0..10 {
            store.sync_weights(bots.clone(), BTreeMap::new(), i);
        }
        let settings = store.current();
        assert_eq!(settings.risk_multiplier, 1.0);
        assert_eq!(settings.confidence_threshold, 0.6);
        assert_eq!(settings.bot_weight("B1"), 1.25);
        assert_eq!(settings.version, 10);
    }

    #[test]
    fn test_reconcile_needs_enough_history() {
        let store = store();
        let result = store.reconcile(BTreeMap::new(), BTreeMap::new(), &outcomes(15, 0), 0);
        assert_eq!(result.recent_performance, None);
        assert_eq!(result.settings.risk_multiplier, 1.0);
    }

    #[test]
    fn test_reconcile_rewards_and_penalizes() {
        let store = store();
        let good = store.reconcile(BTreeMap::new(), BTreeMap::new(), &outcomes(16, 4), 0);
        assert!((good.settings.risk_multiplier - 1.02).abs() < 1e-12);
        assert!((good.settings.confidence_threshold - 0.59).abs() < 1e-12);

        let store = self::store();
        let mut bots = BTreeMap::new();
        bots.insert("B1".to_string(), 1.25);
        let bad = store.reconcile(bots, BTreeMap::new(), &outcomes(4, 16), 0);
        assert!((bad.settings.risk_multiplier - 0.95).abs() < 1e-12);
        assert!((bad.settings.confidence_threshold - 0.62).abs() < 1e-12);
        assert_eq!(bad.settings.bot_weight("B1"), 1.25);
    }

    proptest! {
        #[test]
        fn settings_stay_within_bounds(
            steps in proptest::collection::vec((0.1f64..3.0, -0.5f64..0.5), 0..100)
        ) {
            let store = store();
            for (i, (factor, delta)) in steps.iter().enumerate() {
                let s = store.adjust_risk(*factor, *delta, i as i64);
                prop_assert!(s.risk_multiplier >= 0.25 && s.risk_multiplier <= 2.0);
                prop_assert!(s.confidence_threshold >= 0.4 && s.confidence_threshold <= 0.8);
                prop_assert_eq!(s.version, i as u64 + 1);
            }
        }
    }
}
