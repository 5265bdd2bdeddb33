//! Telemetry Module

mod logging;
mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::{
    init_metrics, record_batch_duration, record_batch_skipped, record_event, record_event_skipped,
    record_feedback, record_learning_metrics, record_outcome_resolved, record_pattern_count,
    record_settings,
};
