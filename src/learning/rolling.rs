//! Bounded recent-outcome windows and fixed-step weight adjustment

use std::collections::VecDeque;

use crate::config::TrackerConfig;
use crate::utils::helpers::{clamp, ratio_of};

/// Push into a FIFO window, evicting the oldest entries past `capacity`
pub fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
    window.push_back(value);
    while window.len() > capacity {
        window.pop_front();
    }
}

/// Share of successes in the window; `neutral` when empty
pub fn window_score(window: &VecDeque<bool>, neutral: f64) -> f64 {
    ratio_of(window.iter()).unwrap_or(neutral)
}

/// Move `weight` by at most one step toward the direction `score` implies.
///
/// The weight only moves once the window holds `min_samples` entries and is
/// always clamped to the configured bounds.
pub fn step_weight(weight: f64, score: f64, samples: usize, config: &TrackerConfig) -> f64 {
    let stepped = if samples < config.min_samples {
        weight
    } else if score > config.improve_above {
        weight + config.step
    } else if score < config.degrade_below {
        weight - config.step
    } else {
        weight
    };
    // Round away float drift so weights stay on the step grid
    let snapped = (stepped * 1e9).round() / 1e9;
    clamp(snapped, config.min_weight, config.max_weight)
}
