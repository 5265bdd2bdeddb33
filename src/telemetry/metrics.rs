//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::learning::{AdaptiveSettings, FeedbackImpact, LearningMetrics};

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Ingestion
    describe_counter!("learning_engine_events_total", "Inbound events received, by type");
    describe_counter!("learning_engine_events_skipped_total", "Inbound events rejected, by reason");
    describe_counter!("learning_engine_outcomes_resolved_total", "Trades resolved, by result");
    describe_counter!("learning_engine_feedback_total", "Feedback loops processed, by impact");

    // Learning summary
    describe_gauge!("learning_engine_success_rate", "Success rate over the metrics window");
    describe_gauge!("learning_engine_sharpe_ratio", "Sharpe-like ratio over the metrics window");
    describe_gauge!("learning_engine_max_drawdown", "Max drawdown of the cumulative return path");
    describe_gauge!("learning_engine_pattern_count", "Patterns currently stored");
    describe_gauge!("learning_engine_model_accuracy", "Mean accuracy of active models");

    // Adaptive settings
    describe_gauge!("learning_engine_risk_multiplier", "Current adaptive risk multiplier");
    describe_gauge!("learning_engine_confidence_threshold", "Current adaptive confidence threshold");
    describe_gauge!("learning_engine_settings_version", "Adaptive settings version");

    // Batch jobs
    describe_histogram!("learning_engine_batch_duration_ms", "Batch pass duration, by job");
    describe_counter!("learning_engine_batch_skipped_total", "Batch passes skipped, by job");
}

pub fn record_event(event_type: &'static str) {
    counter!("learning_engine_events_total", "type" => event_type).increment(1);
}

pub fn record_event_skipped(reason: &'static str) {
    counter!("learning_engine_events_skipped_total", "reason" => reason).increment(1);
}

pub fn record_outcome_resolved(won: bool) {
    let result = if won { "win" } else { "not_win" };
    counter!("learning_engine_outcomes_resolved_total", "result" => result).increment(1);
}

pub fn record_feedback(impact: FeedbackImpact) {
    let impact = match impact {
        FeedbackImpact::Low => "low",
        FeedbackImpact::Medium => "medium",
        FeedbackImpact::High => "high",
    };
    counter!("learning_engine_feedback_total", "impact" => impact).increment(1);
}

pub fn record_learning_metrics(metrics: &LearningMetrics) {
    gauge!("learning_engine_success_rate").set(metrics.success_rate);
    gauge!("learning_engine_sharpe_ratio").set(metrics.sharpe_ratio);
    gauge!("learning_engine_max_drawdown").set(metrics.max_drawdown);
    gauge!("learning_engine_pattern_count").set(metrics.pattern_count as f64);
    gauge!("learning_engine_model_accuracy").set(metrics.model_accuracy);
}

pub fn record_pattern_count(count: usize) {
    gauge!("learning_engine_pattern_count").set(count as f64);
}

pub fn record_settings(settings: &AdaptiveSettings) {
    gauge!("learning_engine_risk_multiplier").set(settings.risk_multiplier);
    gauge!("learning_engine_confidence_threshold").set(settings.confidence_threshold);
    gauge!("learning_engine_settings_version").set(settings.version as f64);
}

pub fn record_batch_duration(job: &'static str, duration_ms: f64) {
    histogram!("learning_engine_batch_duration_ms", "job" => job).record(duration_ms);
}

pub fn record_batch_skipped(job: &'static str) {
    counter!("learning_engine_batch_skipped_total", "job" => job).increment(1);
}
