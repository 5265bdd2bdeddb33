//! Portfolio learning
//!
//! Running realized-P&L statistics over every resolved trade: streaks,
//! high-water mark and drawdown.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::outcome_store::{OutcomeClass, TradeOutcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLearning {
    pub closed_trades: u64,
    pub winning_trades: u64,
    pub realized_pnl: f64,
    /// Positive for a win streak, negative for a loss streak
    pub current_streak: i32,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
    pub peak_pnl: f64,
    /// Largest absolute fall of realized P&L from its peak
    pub max_drawdown: f64,
    pub avg_abs_pnl: f64,
    pub last_updated: i64,
}

impl PortfolioLearning {
    pub fn win_rate(&self) -> f64 {
        if self.closed_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.closed_trades as f64
    }

    pub fn current_drawdown(&self) -> f64 {
        self.peak_pnl - self.realized_pnl
    }

    pub fn loss_streak(&self) -> u32 {
        if self.current_streak < 0 {
            self.current_streak.unsigned_abs()
        } else {
            0
        }
    }

    fn fold(&mut self, outcome: &TradeOutcome, now: i64) {
        let Some(pnl) = outcome.pnl else { return };

        self.closed_trades += 1;
        self.avg_abs_pnl += (pnl.abs() - self.avg_abs_pnl) / self.closed_trades as f64;
        self.realized_pnl += pnl;
        if self.realized_pnl > self.peak_pnl {
            self.peak_pnl = self.realized_pnl;
        }
        self.max_drawdown = self.max_drawdown.max(self.current_drawdown());

        match outcome.outcome {
            OutcomeClass::Win => {
                self.winning_trades += 1;
                self.current_streak = self.current_streak.max(0) + 1;
                self.longest_win_streak = self.longest_win_streak.max(self.current_streak as u32);
            }
            OutcomeClass::Loss => {
                self.current_streak = self.current_streak.min(0) - 1;
                self.longest_loss_streak = self.longest_loss_streak.max(self.loss_streak());
            }
            OutcomeClass::Breakeven | OutcomeClass::Open => {
                self.current_streak = 0;
            }
        }
        self.last_updated = now;
    }
}

/// Result of folding one resolved trade
#[derive(Debug, Clone)]
pub struct PortfolioUpdate {
    /// Mean absolute P&L before this trade
    pub previous_avg_abs_pnl: f64,
    pub previous_trades: u64,
    pub learning: PortfolioLearning,
}

#[derive(Default)]
pub struct PortfolioTracker {
    state: Mutex<PortfolioLearning>,
}

impl PortfolioTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &TradeOutcome, now: i64) -> PortfolioUpdate {
        let mut state = self.state.lock();
        let previous_avg_abs_pnl = state.avg_abs_pnl;
        let previous_trades = state.closed_trades;
        state.fold(outcome, now);
        PortfolioUpdate {
            previous_avg_abs_pnl,
            previous_trades,
            learning: state.clone(),
        }
    }

    pub fn current(&self) -> PortfolioLearning {
        self.state.lock().clone()
    }

    pub fn restore(&self, learning: PortfolioLearning) {
        *self.state.lock() = learning;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(pnl: f64) -> TradeOutcome {
        TradeOutcome {
            trade_id: "t".into(),
            symbol: "AAPL".into(),
            side: None,
            entry_price: None,
            exit_price: None,
            quantity: None,
            pnl: Some(pnl),
            return_pct: None,
            holding_period_ms: None,
            outcome: OutcomeClass::from_pnl(Some(pnl)),
            executed_at: 0,
            closed_at: Some(0),
            signals: Vec::new(),
            bot_id: None,
            entry_confidence: None,
            exit_reason: None,
            max_adverse: None,
            max_favorable: None,
        }
    }

    #[test]
    fn test_streaks() {
        let tracker = PortfolioTracker::new();
        for pnl in [10.0, 5.0, 5.0, -1.0, -2.0] {
            tracker.record(&closed(pnl), 0);
        }
        let state = tracker.current();
        assert_eq!(state.current_streak, -2);
        assert_eq!(state.longest_win_streak, 3);
        assert_eq!(state.longest_loss_streak, 2);
        assert_eq!(state.loss_streak(), 2);
        assert_eq!(state.win_rate(), 0.6);

        tracker.record(&closed(0.0), 0);
        assert_eq!(tracker.current().current_streak, 0);
    }

    #[test]
    fn test_drawdown_and_averages() {
        let tracker = PortfolioTracker::new();
        tracker.record(&closed(100.0), 0);
        tracker.record(&closed(-40.0), 0);
        let update = tracker.record(&closed(-20.0), 9);

        assert_eq!(update.previous_trades, 2);
        assert_eq!(update.previous_avg_abs_pnl, 70.0);
        let state = update.learning;
        assert_eq!(state.peak_pnl, 100.0);
        assert_eq!(state.realized_pnl, 40.0);
        assert_eq!(state.max_drawdown, 60.0);
        assert_eq!(state.last_updated, 9);
    }
}
