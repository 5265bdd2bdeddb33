//! Configuration module
//!
//! Handles loading and validation of the engine configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.learning.validate()?;
        anyhow::ensure!(
            self.scheduler.pattern_interval_secs > 0
                && self.scheduler.metrics_interval_secs > 0
                && self.scheduler.retrain_interval_secs > 0
                && self.scheduler.reconcile_interval_secs > 0,
            "scheduler intervals must be positive"
        );
        Ok(())
    }
}

/// Learning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bots: TrackerConfig,
    #[serde(default = "TrackerConfig::signal_defaults")]
    pub signals: TrackerConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            bots: TrackerConfig::default(),
            signals: TrackerConfig::signal_defaults(),
            patterns: PatternConfig::default(),
            predictor: PredictorConfig::default(),
            settings: SettingsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl LearningConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.store.outcome_capacity > 0, "outcome_capacity must be positive");
        anyhow::ensure!(self.store.feedback_capacity > 0, "feedback_capacity must be positive");
        anyhow::ensure!(self.store.insight_capacity > 0, "insight_capacity must be positive");
        self.bots.validate("bots")?;
        self.signals.validate("signals")?;
        anyhow::ensure!(
            self.patterns.neutral_band_low < self.patterns.neutral_band_high,
            "patterns.neutral_band_low must be below neutral_band_high"
        );
        anyhow::ensure!(
            self.patterns.moderate_confidence < self.patterns.strong_confidence,
            "patterns.moderate_confidence must be below strong_confidence"
        );
        anyhow::ensure!(
            self.settings.min_confidence_threshold <= self.settings.default_confidence_threshold
                && self.settings.default_confidence_threshold <= self.settings.max_confidence_threshold,
            "settings.default_confidence_threshold must lie within its bounds"
        );
        anyhow::ensure!(
            self.settings.min_risk_multiplier <= self.settings.default_risk_multiplier
                && self.settings.default_risk_multiplier <= self.settings.max_risk_multiplier,
            "settings.default_risk_multiplier must lie within its bounds"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.predictor.poor_win_rate),
            "predictor.poor_win_rate must lie in [0, 1]"
        );
        anyhow::ensure!(self.metrics.window > 0, "metrics.window must be positive");
        Ok(())
    }
}

/// Bounded collection sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_outcome_capacity")]
    pub outcome_capacity: usize,
    #[serde(default = "default_feedback_capacity")]
    pub feedback_capacity: usize,
    #[serde(default = "default_insight_capacity")]
    pub insight_capacity: usize,
}

fn default_outcome_capacity() -> usize { 10_000 }
fn default_feedback_capacity() -> usize { 1_000 }
fn default_insight_capacity() -> usize { 100 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            outcome_capacity: default_outcome_capacity(),
            feedback_capacity: default_feedback_capacity(),
            insight_capacity: default_insight_capacity(),
        }
    }
}

/// Rolling-window tracker parameters (shared shape for bots and signals)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Recent outcomes kept per key
    #[serde(default = "default_window")]
    pub window: usize,
    /// Samples required before the weight starts moving
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Fixed weight increment per update
    pub step: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Score above which the weight steps up
    #[serde(default = "default_improve_above")]
    pub improve_above: f64,
    /// Score below which the weight steps down
    #[serde(default = "default_degrade_below")]
    pub degrade_below: f64,
}

fn default_window() -> usize { 50 }
fn default_min_samples() -> usize { 5 }
fn default_improve_above() -> f64 { 0.6 }
fn default_degrade_below() -> f64 { 0.4 }

impl TrackerConfig {
    /// Signal multipliers move faster and wider than bot weights
    pub fn signal_defaults() -> Self {
        Self {
            step: 0.1,
            min_weight: 0.2,
            max_weight: 1.8,
            ..Self::default()
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        anyhow::ensure!(self.window > 0, "{}.window must be positive", name);
        anyhow::ensure!(self.step > 0.0, "{}.step must be positive", name);
        anyhow::ensure!(
            self.min_weight > 0.0 && self.min_weight <= 1.0 && self.max_weight >= 1.0,
            "{}: weight bounds must bracket the neutral weight 1.0",
            name
        );
        anyhow::ensure!(
            self.degrade_below <= self.improve_above,
            "{}.degrade_below must not exceed improve_above",
            name
        );
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_samples: default_min_samples(),
            step: 0.05,
            min_weight: 0.3,
            max_weight: 1.5,
            improve_above: default_improve_above(),
            degrade_below: default_degrade_below(),
        }
    }
}

/// Pattern analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default = "default_min_total_outcomes")]
    pub min_total_outcomes: usize,
    #[serde(default = "default_symbol_min_samples")]
    pub symbol_min_samples: usize,
    #[serde(default = "default_time_min_samples")]
    pub time_bucket_min_samples: usize,
    #[serde(default = "default_signal_type_min_samples")]
    pub signal_type_min_samples: usize,
    #[serde(default = "default_severity_min_samples")]
    pub severity_min_samples: usize,
    #[serde(default = "default_neutral_band_low")]
    pub neutral_band_low: f64,
    #[serde(default = "default_neutral_band_high")]
    pub neutral_band_high: f64,
    /// Sample size at which sample confidence saturates
    #[serde(default = "default_saturation_samples")]
    pub saturation_samples: usize,
    #[serde(default = "default_moderate_confidence")]
    pub moderate_confidence: f64,
    #[serde(default = "default_strong_confidence")]
    pub strong_confidence: f64,
}

fn default_min_total_outcomes() -> usize { 50 }
fn default_symbol_min_samples() -> usize { 10 }
fn default_time_min_samples() -> usize { 5 }
fn default_signal_type_min_samples() -> usize { 10 }
fn default_severity_min_samples() -> usize { 5 }
fn default_neutral_band_low() -> f64 { 0.4 }
fn default_neutral_band_high() -> f64 { 0.6 }
fn default_saturation_samples() -> usize { 100 }
fn default_moderate_confidence() -> f64 { 0.6 }
fn default_strong_confidence() -> f64 { 0.8 }

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_total_outcomes: default_min_total_outcomes(),
            symbol_min_samples: default_symbol_min_samples(),
            time_bucket_min_samples: default_time_min_samples(),
            signal_type_min_samples: default_signal_type_min_samples(),
            severity_min_samples: default_severity_min_samples(),
            neutral_band_low: default_neutral_band_low(),
            neutral_band_high: default_neutral_band_high(),
            saturation_samples: default_saturation_samples(),
            moderate_confidence: default_moderate_confidence(),
            strong_confidence: default_strong_confidence(),
        }
    }
}

/// Risk/return predictor thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    #[serde(default = "default_min_return_history")]
    pub min_return_history: usize,
    #[serde(default = "default_concentration_threshold")]
    pub concentration_threshold: f64,
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    #[serde(default = "default_leverage_threshold")]
    pub leverage_threshold: f64,
    #[serde(default = "default_drawdown_threshold")]
    pub drawdown_threshold: f64,
    #[serde(default = "default_position_weight_threshold")]
    pub position_weight_threshold: f64,
    #[serde(default = "default_unrealized_loss_threshold")]
    pub unrealized_loss_threshold: f64,
    #[serde(default = "default_severe_unrealized_loss_threshold")]
    pub severe_unrealized_loss_threshold: f64,
    /// Newest resolved trades considered for the recent-performance factor
    #[serde(default = "default_recent_performance_window")]
    pub recent_performance_window: usize,
    #[serde(default = "default_recent_performance_min_trades")]
    pub recent_performance_min_trades: usize,
    #[serde(default = "default_symbol_history_min_trades")]
    pub symbol_history_min_trades: usize,
    /// Win rate below which history counts against a portfolio or symbol
    #[serde(default = "default_poor_win_rate")]
    pub poor_win_rate: f64,
}

fn default_min_return_history() -> usize { 10 }
fn default_concentration_threshold() -> f64 { 0.25 }
fn default_volatility_threshold() -> f64 { 0.20 }
fn default_leverage_threshold() -> f64 { 2.0 }
fn default_drawdown_threshold() -> f64 { 0.10 }
fn default_position_weight_threshold() -> f64 { 0.20 }
fn default_unrealized_loss_threshold() -> f64 { 0.05 }
fn default_severe_unrealized_loss_threshold() -> f64 { 0.10 }
fn default_recent_performance_window() -> usize { 50 }
fn default_recent_performance_min_trades() -> usize { 20 }
fn default_symbol_history_min_trades() -> usize { 10 }
fn default_poor_win_rate() -> f64 { 0.4 }

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_return_history: default_min_return_history(),
            concentration_threshold: default_concentration_threshold(),
            volatility_threshold: default_volatility_threshold(),
            leverage_threshold: default_leverage_threshold(),
            drawdown_threshold: default_drawdown_threshold(),
            position_weight_threshold: default_position_weight_threshold(),
            unrealized_loss_threshold: default_unrealized_loss_threshold(),
            severe_unrealized_loss_threshold: default_severe_unrealized_loss_threshold(),
            recent_performance_window: default_recent_performance_window(),
            recent_performance_min_trades: default_recent_performance_min_trades(),
            symbol_history_min_trades: default_symbol_history_min_trades(),
            poor_win_rate: default_poor_win_rate(),
        }
    }
}

/// Adaptive settings bounds and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_risk_multiplier")]
    pub default_risk_multiplier: f64,
    #[serde(default = "default_min_risk_multiplier")]
    pub min_risk_multiplier: f64,
    #[serde(default = "default_max_risk_multiplier")]
    pub max_risk_multiplier: f64,
    #[serde(default = "default_confidence_threshold")]
    pub default_confidence_threshold: f64,
    #[serde(default = "default_min_confidence_threshold")]
    pub min_confidence_threshold: f64,
    #[serde(default = "default_max_confidence_threshold")]
    pub max_confidence_threshold: f64,
    /// Recent resolved trades considered by reconciliation
    #[serde(default = "default_reconcile_window")]
    pub reconcile_window: usize,
    #[serde(default = "default_reconcile_min_samples")]
    pub reconcile_min_samples: usize,
}

fn default_risk_multiplier() -> f64 { 1.0 }
fn default_min_risk_multiplier() -> f64 { 0.25 }
fn default_max_risk_multiplier() -> f64 { 2.0 }
fn default_confidence_threshold() -> f64 { 0.6 }
fn default_min_confidence_threshold() -> f64 { 0.4 }
fn default_max_confidence_threshold() -> f64 { 0.8 }
fn default_reconcile_window() -> usize { 100 }
fn default_reconcile_min_samples() -> usize { 20 }

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            default_risk_multiplier: default_risk_multiplier(),
            min_risk_multiplier: default_min_risk_multiplier(),
            max_risk_multiplier: default_max_risk_multiplier(),
            default_confidence_threshold: default_confidence_threshold(),
            min_confidence_threshold: default_min_confidence_threshold(),
            max_confidence_threshold: default_max_confidence_threshold(),
            reconcile_window: default_reconcile_window(),
            reconcile_min_samples: default_reconcile_min_samples(),
        }
    }
}

/// Metrics aggregator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_window")]
    pub window: usize,
    /// Resolved trades needed before model retraining runs
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
}

fn default_metrics_window() -> usize { 1_000 }
fn default_min_training_samples() -> usize { 20 }
fn default_validation_fraction() -> f64 { 0.2 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: default_metrics_window(),
            min_training_samples: default_min_training_samples(),
            validation_fraction: default_validation_fraction(),
        }
    }
}

/// Periodic job cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_pattern_interval")]
    pub pattern_interval_secs: u64,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_secs: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

fn default_pattern_interval() -> u64 { 4 * 60 * 60 }
fn default_metrics_interval() -> u64 { 5 * 60 }
fn default_retrain_interval() -> u64 { 24 * 60 * 60 }
fn default_reconcile_interval() -> u64 { 15 * 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern_interval_secs: default_pattern_interval(),
            metrics_interval_secs: default_metrics_interval(),
            retrain_interval_secs: default_retrain_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Directory for daily-rotated log files
    pub log_dir: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            log_dir: None,
            metrics_port: default_metrics_port(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.learning.store.outcome_capacity, 10_000);
        assert_eq!(config.learning.bots.step, 0.05);
        assert_eq!(config.learning.signals.step, 0.1);
        assert_eq!(config.learning.signals.max_weight, 1.8);
        assert_eq!(config.learning.patterns.min_total_outcomes, 50);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
learning:
  store:
    outcome_capacity: 500
  patterns:
    symbol_min_samples: 20
scheduler:
  pattern_interval_secs: 60
telemetry:
  log_level: debug
  json_logs: true
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.learning.store.outcome_capacity, 500);
        assert_eq!(config.learning.store.feedback_capacity, 1_000);
        assert_eq!(config.learning.patterns.symbol_min_samples, 20);
        assert_eq!(config.scheduler.pattern_interval_secs, 60);
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let yaml = r#"
learning:
  bots:
    step: 0.05
    min_weight: 1.2
    max_weight: 1.5
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }
}
