//! Learning Scheduler
//!
//! Periodic batch passes on independent tokio intervals:
//! - Pattern analysis
//! - Metrics aggregation
//! - Model retraining
//! - Settings reconciliation

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::engine::LearningEngine;
use super::patterns::AnalysisOutcome;
use crate::config::SchedulerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledJob {
    Patterns,
    Metrics,
    Retrain,
    Reconcile,
}

impl ScheduledJob {
    pub const ALL: [ScheduledJob; 4] = [
        ScheduledJob::Patterns,
        ScheduledJob::Metrics,
        ScheduledJob::Retrain,
        ScheduledJob::Reconcile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScheduledJob::Patterns => "patterns",
            ScheduledJob::Metrics => "metrics",
            ScheduledJob::Retrain => "retrain",
            ScheduledJob::Reconcile => "reconcile",
        }
    }

    pub fn interval(&self, config: &SchedulerConfig) -> Duration {
        let secs = match self {
            ScheduledJob::Patterns => config.pattern_interval_secs,
            ScheduledJob::Metrics => config.metrics_interval_secs,
            ScheduledJob::Retrain => config.retrain_interval_secs,
            ScheduledJob::Reconcile => config.reconcile_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Run one pass of this job against the engine
    pub fn run(&self, engine: &LearningEngine) {
        match self {
            ScheduledJob::Patterns => {
                if let AnalysisOutcome::Skipped(reason) = engine.run_pattern_analysis() {
                    debug!("Scheduled pattern analysis skipped: {:?}", reason);
                }
            }
            ScheduledJob::Metrics => {
                if let Err(reason) = engine.run_metrics_pass() {
                    debug!("Scheduled metrics pass skipped: {:?}", reason);
                }
            }
            ScheduledJob::Retrain => {
                if let Err(reason) = engine.retrain_models() {
                    debug!("Scheduled retrain skipped: {:?}", reason);
                }
            }
            ScheduledJob::Reconcile => {
                engine.reconcile_settings();
            }
        }
    }
}

pub struct LearningScheduler {
    config: SchedulerConfig,
    engine: Arc<LearningEngine>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LearningScheduler {
    pub fn new(config: SchedulerConfig, engine: Arc<LearningEngine>) -> Self {
        Self {
            config,
            engine,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn one interval task per job. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if !self.config.enabled {
            info!("Learning scheduler disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Learning scheduler already running");
            return;
        }
        info!("Learning scheduler starting");

        let mut tasks = self.tasks.lock();
        for job in ScheduledJob::ALL {
            let period = job.interval(&self.config);
            let running = self.running.clone();
            let engine = self.engine.clone();

            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // First tick fires immediately
                interval.tick().await;

                while running.load(Ordering::SeqCst) {
                    interval.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    debug!("Scheduled {} pass", job.name());
                    job.run(&engine);
                }
            }));
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Learning scheduler stopping");
    }
}

impl Drop for LearningScheduler {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
