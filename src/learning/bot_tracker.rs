//! Bot Performance Tracker
//!
//! Per-bot rolling accuracy and the derived confidence weight. Accuracy is
//! always recomputed from the bounded recent window, never from all-time
//! totals.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

use super::rolling::{push_bounded, step_weight, window_score};
use crate::config::TrackerConfig;

const NEUTRAL_ACCURACY: f64 = 0.5;
const NEUTRAL_WEIGHT: f64 = 1.0;

/// Rolling statistics for one trading bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPerformance {
    pub bot_id: String,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub cumulative_pnl: f64,
    /// Win rate over the recent window
    pub accuracy_score: f64,
    pub confidence_weight: f64,
    pub avg_holding_period_ms: f64,
    #[serde(default)]
    pub holding_samples: u64,
    pub recent_outcomes: VecDeque<bool>,
    #[serde(default)]
    pub decisions_made: u64,
    #[serde(default)]
    pub last_decision_confidence: Option<f64>,
    pub last_updated: i64,
}

impl BotPerformance {
    /// Cold-start record: neutral, not penalized
    pub fn neutral(bot_id: &str) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            total_trades: 0,
            winning_trades: 0,
            cumulative_pnl: 0.0,
            accuracy_score: NEUTRAL_ACCURACY,
            confidence_weight: NEUTRAL_WEIGHT,
            avg_holding_period_ms: 0.0,
            holding_samples: 0,
            recent_outcomes: VecDeque::new(),
            decisions_made: 0,
            last_decision_confidence: None,
            last_updated: 0,
        }
    }

    pub fn all_time_win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return NEUTRAL_ACCURACY;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }
}

/// Weight change produced by one update
#[derive(Debug, Clone)]
pub struct BotUpdate {
    pub previous_weight: f64,
    pub performance: BotPerformance,
}

impl BotUpdate {
    pub fn weight_delta(&self) -> f64 {
        self.performance.confidence_weight - self.previous_weight
    }
}

pub struct BotTracker {
    config: TrackerConfig,
    bots: DashMap<String, BotPerformance>,
}

impl BotTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            bots: DashMap::new(),
        }
    }

    /// Fold one resolved trade into the bot's statistics.
    ///
    /// The entry lock is held for the whole read-modify-write, so concurrent
    /// updates to one bot serialize.
    pub fn update(
        &self,
        bot_id: &str,
        won: bool,
        pnl: f64,
        holding_ms: Option<i64>,
        now: i64,
    ) -> BotUpdate {
        let mut entry = self.bots
            .entry(bot_id.to_string())
            .or_insert_with(|| BotPerformance::neutral(bot_id));
        let perf = entry.value_mut();
        let previous_weight = perf.confidence_weight;

        perf.total_trades += 1;
        if won {
            perf.winning_trades += 1;
        }
        perf.cumulative_pnl += pnl;
        if let Some(ms) = holding_ms {
            perf.holding_samples += 1;
            perf.avg_holding_period_ms +=
                (ms as f64 - perf.avg_holding_period_ms) / perf.holding_samples as f64;
        }

        push_bounded(&mut perf.recent_outcomes, won, self.config.window);
        perf.accuracy_score = window_score(&perf.recent_outcomes, NEUTRAL_ACCURACY);
        perf.confidence_weight = step_weight(
            perf.confidence_weight,
            perf.accuracy_score,
            perf.recent_outcomes.len(),
            &self.config,
        );
        perf.last_updated = now;

        debug!(
            "Bot {} updated: accuracy {:.3}, weight {:.2} -> {:.2}",
            bot_id, perf.accuracy_score, previous_weight, perf.confidence_weight
        );

        BotUpdate {
            previous_weight,
            performance: perf.clone(),
        }
    }

    /// Count a decision made by the bot
    pub fn record_decision(&self, bot_id: &str, confidence: Option<f64>, now: i64) -> BotPerformance {
        let mut entry = self.bots
            .entry(bot_id.to_string())
            .or_insert_with(|| BotPerformance::neutral(bot_id));
        let perf = entry.value_mut();
        perf.decisions_made += 1;
        if confidence.is_some() {
            perf.last_decision_confidence = confidence;
        }
        perf.last_updated = now;
        perf.clone()
    }

    /// Current snapshot, or the neutral record for an unseen bot
    pub fn get(&self, bot_id: &str) -> BotPerformance {
        self.bots
            .get(bot_id)
            .map(|perf| perf.clone())
            .unwrap_or_else(|| BotPerformance::neutral(bot_id))
    }

    pub fn contains(&self, bot_id: &str) -> bool {
        self.bots.contains_key(bot_id)
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn all(&self) -> Vec<BotPerformance> {
        let mut bots: Vec<_> = self.bots.iter().map(|e| e.value().clone()).collect();
        bots.sort_by(|a, b| a.bot_id.cmp(&b.bot_id));
        bots
    }

    /// Bots ranked by confidence weight, then accuracy, then trade count
    pub fn top(&self, n: usize) -> Vec<BotPerformance> {
        let mut bots = self.all();
        bots.sort_by(|a, b| {
            b.confidence_weight.total_cmp(&a.confidence_weight)
                .then(b.accuracy_score.total_cmp(&a.accuracy_score))
                .then(b.total_trades.cmp(&a.total_trades))
        });
        bots.truncate(n);
        bots
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.bots.iter()
            .map(|e| (e.key().clone(), e.value().confidence_weight))
            .collect()
    }

    pub fn restore(&self, bots: Vec<BotPerformance>) {
        for perf in bots {
            self.bots.insert(perf.bot_id.clone(), perf);
        }
    }
}
