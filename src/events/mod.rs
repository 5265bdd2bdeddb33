//! Events module
//!
//! Inbound event payloads, outbound engine events and the plumbing between
//! the engine and the rest of the trading system.

pub mod bus;
pub mod types;

pub use bus::{
    inbound_channel, spawn_event_handler, CallbackSink, EventBus, EventProcessor, EventSink,
    InboundSender, NullSink,
};
#[cfg(test)]
pub use bus::MockEventSink;
pub use types::{
    BotDecision, InboundEvent, InterventionKind, LearningEvent, RiskIntervention, SignalOutcome,
    SignalRef, TradeClosed, TradeExecuted,
};
