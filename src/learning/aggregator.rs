//! Metrics Aggregator
//!
//! Periodic summary of the most recent outcomes:
//! - Success rate over resolved trades
//! - Average return and Sharpe-like ratio
//! - Max drawdown of the cumulative return path
//! - Data quality from the resolved share

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::batch::{BatchGuard, SkipReason};
use super::outcome_store::TradeOutcome;
use crate::utils::helpers::{mean, population_std_dev, safe_div};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl DataQuality {
    pub fn from_resolved_share(share: f64) -> Self {
        if share >= 0.9 {
            DataQuality::Excellent
        } else if share >= 0.7 {
            DataQuality::Good
        } else if share >= 0.5 {
            DataQuality::Fair
        } else {
            DataQuality::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_trades: usize,
    pub resolved_trades: usize,
    pub successful_trades: usize,
    pub success_rate: f64,
    pub avg_return: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall of the cumulative return
    pub max_drawdown: f64,
    pub pattern_count: usize,
    /// Mean accuracy of active models
    pub model_accuracy: f64,
    pub data_quality: DataQuality,
    pub computed_at: i64,
}

impl LearningMetrics {
    pub fn empty(now: i64) -> Self {
        Self {
            total_trades: 0,
            resolved_trades: 0,
            successful_trades: 0,
            success_rate: 0.0,
            avg_return: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            pattern_count: 0,
            model_accuracy: 0.0,
            data_quality: DataQuality::Poor,
            computed_at: now,
        }
    }
}

/// Mean over population standard deviation, unannualized
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = population_std_dev(returns);
    if std_dev == 0.0 {
        return 0.0;
    }
    mean(returns) / std_dev
}

/// Largest absolute fall from a running peak of the cumulative sum
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut cumulative = 0.0_f64;
    let mut max_dd = 0.0_f64;

    for r in returns {
        cumulative += r;
        if cumulative > peak {
            peak = cumulative;
        }
        let drawdown = peak - cumulative;
        if drawdown > max_dd {
            max_dd = drawdown;
        }
    }

    max_dd
}

/// Summarize `outcomes` (oldest first)
pub fn compute_metrics(
    outcomes: &[TradeOutcome],
    pattern_count: usize,
    model_accuracy: f64,
    now: i64,
) -> LearningMetrics {
    if outcomes.is_empty() {
        return LearningMetrics {
            pattern_count,
            model_accuracy,
            ..LearningMetrics::empty(now)
        };
    }

    let resolved: Vec<&TradeOutcome> = outcomes.iter().filter(|o| o.is_resolved()).collect();
    let successful = resolved.iter().filter(|o| o.is_winner()).count();
    let returns: Vec<f64> = resolved.iter().filter_map(|o| o.return_pct).collect();

    LearningMetrics {
        total_trades: outcomes.len(),
        resolved_trades: resolved.len(),
        successful_trades: successful,
        success_rate: safe_div(successful as f64, resolved.len() as f64),
        avg_return: mean(&returns),
        sharpe_ratio: sharpe_ratio(&returns),
        max_drawdown: max_drawdown(&returns),
        pattern_count,
        model_accuracy,
        data_quality: DataQuality::from_resolved_share(resolved.len() as f64 / outcomes.len() as f64),
        computed_at: now,
    }
}

/// Publishes the latest metrics snapshot
pub struct MetricsAggregator {
    window: usize,
    current: ArcSwap<LearningMetrics>,
    guard: BatchGuard,
}

impl MetricsAggregator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            current: ArcSwap::from_pointee(LearningMetrics::empty(0)),
            guard: BatchGuard::new("metrics"),
        }
    }

    /// Outcomes the aggregator looks at
    pub fn window(&self) -> usize {
        self.window
    }

    /// Recompute from `outcomes` and publish
    pub fn refresh(
        &self,
        outcomes: &[TradeOutcome],
        pattern_count: usize,
        model_accuracy: f64,
        now: i64,
    ) -> Result<LearningMetrics, SkipReason> {
        self.guard.try_run(|| {
            let skip = outcomes.len().saturating_sub(self.window);
            let metrics = compute_metrics(&outcomes[skip..], pattern_count, model_accuracy, now);
            info!(
                "Metrics updated: {} trades, success {:.1}%, sharpe {:.2}, quality {:?}",
                metrics.total_trades,
                metrics.success_rate * 100.0,
                metrics.sharpe_ratio,
                metrics.data_quality
            );
            self.current.store(Arc::new(metrics.clone()));
            metrics
        })
    }

    pub fn current(&self) -> Arc<LearningMetrics> {
        self.current.load_full()
    }

    pub fn restore(&self, metrics: LearningMetrics) {
        self.current.store(Arc::new(metrics));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::outcome_store::OutcomeClass;

    fn outcome(i: usize, ret: Option<f64>) -> TradeOutcome {
        let pnl = ret.map(|r| r * 100.0);
        TradeOutcome {
            trade_id: format!("t{}", i),
            symbol: "AAPL".into(),
            side: None,
            entry_price: Some(100.0),
            exit_price: None,
            quantity: Some(1.0),
            pnl,
            return_pct: ret,
            holding_period_ms: None,
            outcome: OutcomeClass::from_pnl(pnl),
            executed_at: i as i64,
            closed_at: None,
            signals: Vec::new(),
            bot_id: None,
            entry_confidence: None,
            exit_reason: None,
            max_adverse: None,
            max_favorable: None,
        }
    }

    #[test]
    fn test_sharpe_edge_cases() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[0.1]), 0.0);
        assert_eq!(sharpe_ratio(&[0.1, 0.1, 0.1]), 0.0);
        assert!((sharpe_ratio(&[0.03, -0.01]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown_of_return_path() {
        assert_eq!(max_drawdown(&[]), 0.0);
        // Path: 0.1, 0.3, 0.1, 0.0, 0.2 -> worst fall 0.3 -> 0.0
        let dd = max_drawdown(&[0.1, 0.2, -0.2, -0.1, 0.2]);
        assert!((dd - 0.3).abs() < 1e-12);
        // Falling from the start measures against zero
        assert!((max_drawdown(&[-0.1, -0.1]) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_compute_metrics() {
        let mut outcomes: Vec<_> = (0..8)
            .map(|i| outcome(i, Some(if i % 2 == 0 { 0.02 } else { -0.01 })))
            .collect();
        outcomes.push(outcome(8, None));
        outcomes.push(outcome(9, None));

        let metrics = compute_metrics(&outcomes, 3, 0.55, 42);
        assert_eq!(metrics.total_trades, 10);
        assert_eq!(metrics.resolved_trades, 8);
        assert_eq!(metrics.successful_trades, 4);
        assert_eq!(metrics.success_rate, 0.5);
        assert!((metrics.avg_return - 0.005).abs() < 1e-12);
        assert_eq!(metrics.data_quality, DataQuality::Good);
        assert_eq!(metrics.pattern_count, 3);
        assert_eq!(metrics.computed_at, 42);
    }

    #[test]
    fn test_empty_window_is_poor_quality() {
        let aggregator = MetricsAggregator::new(1_000);
        let metrics = aggregator.refresh(&[], 0, 0.0, 1).unwrap();
        assert_eq!(metrics.data_quality, DataQuality::Poor);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[test]
    fn test_refresh_uses_newest_window() {
        let aggregator = MetricsAggregator::new(4);
        let mut outcomes: Vec<_> = (0..6).map(|i| outcome(i, Some(-0.01))).collect();
        for i in 6..10 {
            outcomes.push(outcome(i, Some(0.01)));
        }
        let metrics = aggregator.refresh(&outcomes, 0, 0.0, 1).unwrap();
        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(aggregator.current().total_trades, 4);
    }
}
