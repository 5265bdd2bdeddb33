//! Outcome Store
//!
//! Bounded, append-only record of trade outcomes:
//! - Open outcomes created on execution, finalized on close
//! - Re-delivered events overwrite instead of duplicating
//! - Oldest records evicted first once capacity is reached

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::error::{require_id, IngestError};
use crate::events::{SignalRef, TradeClosed, TradeExecuted};
use crate::utils::helpers::ratio_of;
use crate::utils::types::Side;

/// Symbol recorded when a close arrives for a trade never seen executing
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Win,
    Loss,
    Breakeven,
    Open,
}

impl OutcomeClass {
    pub fn from_pnl(pnl: Option<f64>) -> Self {
        match pnl {
            Some(p) if p > 0.0 => OutcomeClass::Win,
            Some(p) if p < 0.0 => OutcomeClass::Loss,
            Some(_) => OutcomeClass::Breakeven,
            None => OutcomeClass::Open,
        }
    }
}

/// Trade outcome record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: String,
    pub symbol: String,
    pub side: Option<Side>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub quantity: Option<f64>,
    /// Realized P&L
    pub pnl: Option<f64>,
    /// P&L as a fraction of entry notional
    pub return_pct: Option<f64>,
    pub holding_period_ms: Option<i64>,
    pub outcome: OutcomeClass,
    /// Execution timestamp (ms)
    pub executed_at: i64,
    /// Close timestamp (ms)
    pub closed_at: Option<i64>,
    pub signals: Vec<SignalRef>,
    pub bot_id: Option<String>,
    /// Confidence score at entry
    pub entry_confidence: Option<f64>,
    pub exit_reason: Option<String>,
    /// Worst unrealized P&L while open
    pub max_adverse: Option<f64>,
    /// Best unrealized P&L while open
    pub max_favorable: Option<f64>,
}

impl TradeOutcome {
    fn open(trade_id: String, symbol: String, executed_at: i64) -> Self {
        Self {
            trade_id,
            symbol,
            side: None,
            entry_price: None,
            exit_price: None,
            quantity: None,
            pnl: None,
            return_pct: None,
            holding_period_ms: None,
            outcome: OutcomeClass::Open,
            executed_at,
            closed_at: None,
            signals: Vec::new(),
            bot_id: None,
            entry_confidence: None,
            exit_reason: None,
            max_adverse: None,
            max_favorable: None,
        }
    }

    /// Has both a P&L and a non-open classification
    pub fn is_resolved(&self) -> bool {
        self.pnl.is_some() && self.outcome != OutcomeClass::Open
    }

    pub fn is_winner(&self) -> bool {
        self.outcome == OutcomeClass::Win
    }

    fn entry_notional(&self) -> Option<f64> {
        match (self.entry_price, self.quantity) {
            (Some(price), Some(qty)) if price > 0.0 && qty.abs() > 0.0 => Some(price * qty.abs()),
            _ => None,
        }
    }

    /// P&L implied by prices when none was reported
    fn derived_pnl(&self) -> Option<f64> {
        let (side, entry, exit, qty) = (self.side?, self.entry_price?, self.exit_price?, self.quantity?);
        Some((exit - entry) * qty.abs() * side.direction())
    }

    /// Recompute P&L-derived fields after any change
    fn reclassify(&mut self) {
        if self.pnl.is_none() && self.exit_price.is_some() {
            self.pnl = self.derived_pnl();
        }
        self.outcome = OutcomeClass::from_pnl(self.pnl);
        self.return_pct = match (self.pnl, self.entry_notional()) {
            (Some(pnl), Some(notional)) => Some(pnl / notional),
            _ => None,
        };
        if self.holding_period_ms.is_none() {
            self.holding_period_ms = self.closed_at
                .map(|closed| closed - self.executed_at)
                .filter(|ms| *ms >= 0);
        }
    }

    fn apply_execution(&mut self, event: &TradeExecuted, now: i64) {
        if let Some(symbol) = non_blank(event.symbol.as_deref()) {
            self.symbol = symbol;
        }
        self.side = event.side.or(self.side);
        self.entry_price = finite(event.price).or(self.entry_price);
        self.quantity = finite(event.quantity).or(self.quantity);
        self.bot_id = non_blank(event.bot_id.as_deref()).or_else(|| self.bot_id.take());
        self.entry_confidence = finite(event.confidence).or(self.entry_confidence);
        if !event.signals.is_empty() {
            self.signals = event.signals.clone();
        }
        self.executed_at = event.timestamp.unwrap_or(now);
        self.reclassify();
    }

    fn apply_close(&mut self, event: &TradeClosed, now: i64) {
        if self.symbol == UNKNOWN_SYMBOL {
            if let Some(symbol) = non_blank(event.symbol.as_deref()) {
                self.symbol = symbol;
            }
        }
        if self.bot_id.is_none() {
            self.bot_id = non_blank(event.bot_id.as_deref());
        }
        self.exit_price = finite(event.exit_price).or(self.exit_price);
        self.pnl = finite(event.realized_pnl).or(self.pnl);
        self.holding_period_ms = event.holding_period_ms
            .filter(|ms| *ms >= 0)
            .or(self.holding_period_ms);
        self.exit_reason = event.exit_reason.clone().or_else(|| self.exit_reason.take());
        self.max_adverse = finite(event.max_drawdown).or(self.max_adverse);
        self.max_favorable = finite(event.max_gain).or(self.max_favorable);
        self.closed_at = Some(event.timestamp.unwrap_or(now));
        self.reclassify();
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Result of applying a close event
#[derive(Debug, Clone, PartialEq)]
pub enum CloseResult {
    /// First close that resolved the trade
    Resolved(TradeOutcome),
    /// Trade was already resolved; record overwritten, counters untouched
    Replayed(TradeOutcome),
    /// Close carried no usable P&L; trade stays open
    StillOpen(TradeOutcome),
}

impl CloseResult {
    pub fn outcome(&self) -> &TradeOutcome {
        match self {
            CloseResult::Resolved(o) | CloseResult::Replayed(o) | CloseResult::StillOpen(o) => o,
        }
    }
}

/// Ring of outcomes with a trade-id index.
///
/// Sequence numbers of live entries are contiguous, so an index lookup is
/// `seq - front_seq`.
#[derive(Default)]
struct OutcomeRing {
    entries: VecDeque<(u64, TradeOutcome)>,
    index: HashMap<String, u64>,
    next_seq: u64,
}

impl OutcomeRing {
    fn position(&self, trade_id: &str) -> Option<usize> {
        let seq = *self.index.get(trade_id)?;
        let front = self.entries.front()?.0;
        Some((seq - front) as usize)
    }

    fn get_mut(&mut self, trade_id: &str) -> Option<&mut TradeOutcome> {
        let pos = self.position(trade_id)?;
        self.entries.get_mut(pos).map(|(_, o)| o)
    }

    fn push(&mut self, outcome: TradeOutcome, capacity: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(outcome.trade_id.clone(), seq);
        self.entries.push_back((seq, outcome));
        while self.entries.len() > capacity {
            if let Some((_, evicted)) = self.entries.pop_front() {
                self.index.remove(&evicted.trade_id);
                debug!("Evicted outcome {}", evicted.trade_id);
            }
        }
    }
}

/// Bounded outcome store
pub struct OutcomeStore {
    capacity: usize,
    ring: RwLock<OutcomeRing>,
}

impl OutcomeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: RwLock::new(OutcomeRing::default()),
        }
    }

    /// Upsert an open outcome from a `trade.executed` event
    pub fn record_trade_execution(
        &self,
        event: &TradeExecuted,
        now: i64,
    ) -> Result<TradeOutcome, IngestError> {
        let trade_id = require_id(event.trade_id.as_deref(), "trade_id")?;
        let mut ring = self.ring.write();

        if let Some(existing) = ring.get_mut(&trade_id) {
            existing.apply_execution(event, now);
            return Ok(existing.clone());
        }

        let symbol = non_blank(event.symbol.as_deref()).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string());
        let mut outcome = TradeOutcome::open(trade_id, symbol, now);
        outcome.apply_execution(event, now);
        ring.push(outcome.clone(), self.capacity);
        Ok(outcome)
    }

    /// Find-or-create the outcome for a `trade.closed` event and finalize it
    pub fn record_trade_outcome(
        &self,
        event: &TradeClosed,
        now: i64,
    ) -> Result<CloseResult, IngestError> {
        let trade_id = require_id(event.trade_id.as_deref(), "trade_id")?;
        let mut ring = self.ring.write();

        if let Some(existing) = ring.get_mut(&trade_id) {
            let was_resolved = existing.is_resolved();
            existing.apply_close(event, now);
            let outcome = existing.clone();
            return Ok(if was_resolved {
                CloseResult::Replayed(outcome)
            } else if outcome.is_resolved() {
                CloseResult::Resolved(outcome)
            } else {
                CloseResult::StillOpen(outcome)
            });
        }

        let symbol = non_blank(event.symbol.as_deref()).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string());
        let executed_at = match (event.timestamp, event.holding_period_ms) {
            (Some(closed), Some(held)) if held >= 0 => closed - held,
            _ => event.timestamp.unwrap_or(now),
        };
        let mut outcome = TradeOutcome::open(trade_id, symbol, executed_at);
        outcome.apply_close(event, now);
        ring.push(outcome.clone(), self.capacity);

        Ok(if outcome.is_resolved() {
            CloseResult::Resolved(outcome)
        } else {
            CloseResult::StillOpen(outcome)
        })
    }

    pub fn get(&self, trade_id: &str) -> Option<TradeOutcome> {
        let ring = self.ring.read();
        let pos = ring.position(trade_id)?;
        ring.entries.get(pos).map(|(_, o)| o.clone())
    }

    pub fn len(&self) -> usize {
        self.ring.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of outcomes still open
    pub fn open_count(&self) -> usize {
        self.ring.read().entries.iter()
            .filter(|(_, o)| o.outcome == OutcomeClass::Open)
            .count()
    }

    /// All outcomes, oldest first
    pub fn all(&self) -> Vec<TradeOutcome> {
        self.ring.read().entries.iter().map(|(_, o)| o.clone()).collect()
    }

    /// Most recent `n` outcomes, oldest first
    pub fn window(&self, n: usize) -> Vec<TradeOutcome> {
        let ring = self.ring.read();
        let skip = ring.entries.len().saturating_sub(n);
        ring.entries.iter().skip(skip).map(|(_, o)| o.clone()).collect()
    }

    /// Most recent `n` outcomes, newest first
    pub fn recent(&self, n: usize) -> Vec<TradeOutcome> {
        let ring = self.ring.read();
        ring.entries.iter().rev().take(n).map(|(_, o)| o.clone()).collect()
    }

    /// Outcomes for one symbol, oldest first
    pub fn for_symbol(&self, symbol: &str) -> Vec<TradeOutcome> {
        self.ring.read().entries.iter()
            .map(|(_, o)| o)
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Resolved outcomes among the last `n` stored, oldest first
    pub fn resolved_window(&self, n: usize) -> Vec<TradeOutcome> {
        let ring = self.ring.read();
        let skip = ring.entries.len().saturating_sub(n);
        ring.entries.iter()
            .skip(skip)
            .map(|(_, o)| o)
            .filter(|o| o.is_resolved())
            .cloned()
            .collect()
    }

    /// Win rate over the last `n` resolved outcomes
    pub fn recent_win_rate(&self, n: usize) -> Option<(f64, usize)> {
        let ring = self.ring.read();
        let wins: Vec<bool> = ring.entries.iter().rev()
            .map(|(_, o)| o)
            .filter(|o| o.is_resolved())
            .take(n)
            .map(TradeOutcome::is_winner)
            .collect();
        ratio_of(wins.iter()).map(|rate| (rate, wins.len()))
    }

    /// Re-insert exported outcomes, oldest first
    pub fn restore(&self, outcomes: Vec<TradeOutcome>) {
        let mut ring = self.ring.write();
        for outcome in outcomes {
            if let Some(existing) = ring.get_mut(&outcome.trade_id) {
                *existing = outcome;
            } else {
                ring.push(outcome, self.capacity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executed(id: &str, symbol: &str) -> TradeExecuted {
        TradeExecuted {
            trade_id: Some(id.to_string()),
            symbol: Some(symbol.to_string()),
            side: Some(Side::Buy),
            price: Some(100.0),
            quantity: Some(10.0),
            bot_id: Some("B1".to_string()),
            timestamp: Some(1_000),
            ..Default::default()
        }
    }

    fn closed(id: &str, pnl: Option<f64>) -> TradeClosed {
        TradeClosed {
            trade_id: Some(id.to_string()),
            realized_pnl: pnl,
            timestamp: Some(61_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_execution_creates_open_outcome() {
        let store = OutcomeStore::new(10);
        let outcome = store.record_trade_execution(&executed("t1", "AAPL"), 0).unwrap();
        assert_eq!(outcome.outcome, OutcomeClass::Open);
        assert!(!outcome.is_resolved());
        assert_eq!(store.open_count(), 1);
    }

    #[test]
    fn test_close_resolves_and_derives_return() {
        let store = OutcomeStore::new(10);
        store.record_trade_execution(&executed("t1", "AAPL"), 0).unwrap();

        let result = store.record_trade_outcome(&closed("t1", Some(50.0)), 0).unwrap();
        let outcome = match result {
            CloseResult::Resolved(o) => o,
            other => panic!("expected resolved, got {:?}", other),
        };
        assert_eq!(outcome.outcome, OutcomeClass::Win);
        assert_eq!(outcome.return_pct, Some(0.05));
        assert_eq!(outcome.holding_period_ms, Some(60_000));
    }

    #[test]
    fn test_replayed_close_is_flagged() {
        let store = OutcomeStore::new(10);
        store.record_trade_execution(&executed("t1", "AAPL"), 0).unwrap();
        store.record_trade_outcome(&closed("t1", Some(-5.0)), 0).unwrap();

        let again = store.record_trade_outcome(&closed("t1", Some(-5.0)), 0).unwrap();
        assert!(matches!(again, CloseResult::Replayed(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_execution_overwrites() {
        let store = OutcomeStore::new(10);
        store.record_trade_execution(&executed("t1", "AAPL"), 0).unwrap();
        store.record_trade_execution(&executed("t1", "MSFT"), 0).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("t1").unwrap().symbol, "MSFT");
    }

    #[test]
    fn test_close_without_pnl_stays_open() {
        let store = OutcomeStore::new(10);
        let result = store.record_trade_outcome(&closed("t9", None), 0).unwrap();
        assert!(matches!(result, CloseResult::StillOpen(_)));
        assert_eq!(result.outcome().symbol, UNKNOWN_SYMBOL);
    }

    #[test]
    fn test_pnl_derived_from_exit_price() {
        let store = OutcomeStore::new(10);
        let mut exec = executed("t1", "AAPL");
        exec.side = Some(Side::Sell);
        store.record_trade_execution(&exec, 0).unwrap();

        let mut close = closed("t1", None);
        close.exit_price = Some(95.0);
        let outcome = store.record_trade_outcome(&close, 0).unwrap().outcome().clone();
        assert_eq!(outcome.pnl, Some(50.0));
        assert_eq!(outcome.outcome, OutcomeClass::Win);
    }

    #[test]
    fn test_missing_trade_id_rejected() {
        let store = OutcomeStore::new(10);
        let err = store.record_trade_execution(&TradeExecuted::default(), 0).unwrap_err();
        assert_eq!(err, IngestError::MissingField { field: "trade_id" });
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = OutcomeStore::new(3);
        for i in 0..5 {
            store.record_trade_execution(&executed(&format!("t{}", i), "AAPL"), 0).unwrap();
        }
        assert_eq!(store.len(), 3);
        assert!(store.get("t0").is_none());
        assert!(store.get("t1").is_none());
        assert_eq!(store.get("t4").unwrap().trade_id, "t4");

        // Index still resolves after eviction shifted positions
        store.record_trade_outcome(&closed("t3", Some(1.0)), 0).unwrap();
        assert!(store.get("t3").unwrap().is_resolved());
        assert_eq!(store.recent(1)[0].trade_id, "t4");
    }

    #[test]
    fn test_recent_win_rate() {
        let store = OutcomeStore::new(10);
        for (i, pnl) in [1.0, -1.0, 1.0, 1.0].iter().enumerate() {
            let id = format!("t{}", i);
            store.record_trade_execution(&executed(&id, "AAPL"), 0).unwrap();
            store.record_trade_outcome(&closed(&id, Some(*pnl)), 0).unwrap();
        }
        store.record_trade_execution(&executed("open", "AAPL"), 0).unwrap();
        assert_eq!(store.recent_win_rate(10), Some((0.75, 4)));
        assert_eq!(store.recent_win_rate(1), Some((1.0, 1)));
        assert_eq!(store.resolved_window(2).len(), 1);
        assert_eq!(store.for_symbol("AAPL").len(), 5);
        assert!(store.for_symbol("MSFT").is_empty());
    }
}
