//! Helper functions

use chrono::{TimeZone, Timelike, Utc};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// UTC hour of day (0-23) for a millisecond timestamp
pub fn hour_of_day(timestamp_ms: i64) -> Option<u32> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.hour())
}

pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter()
        .map(|v| (v - m).powi(2))
        .sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Share of `true` entries, or `None` when empty
pub fn ratio_of<'a>(flags: impl IntoIterator<Item = &'a bool>) -> Option<f64> {
    let (hits, total) = flags.into_iter()
        .fold((0usize, 0usize), |(h, t), &f| (h + usize::from(f), t + 1));
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64)
    }
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
