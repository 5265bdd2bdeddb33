//! Adaptive Learning Engine Library
//!
//! Learns from trade outcomes, signal results and risk interventions, and
//! turns them into adaptive trading parameters, detected patterns and risk
//! predictions.

pub mod config;
pub mod error;
pub mod events;
pub mod learning;
pub mod state;
pub mod telemetry;
pub mod utils;

// Re-export main types
pub use config::AppConfig;
pub use error::IngestError;
pub use events::{EventBus, EventSink, InboundEvent, LearningEvent};
pub use learning::{LearningEngine, LearningScheduler};
pub use state::EngineState;
