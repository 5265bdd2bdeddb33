//! Non-reentrant batch passes

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why a batch pass did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    InsufficientData { available: usize, required: usize },
    AlreadyRunning,
}

/// Guard that lets at most one pass of a job run at a time.
///
/// A trigger that arrives while a pass is in flight is dropped.
pub struct BatchGuard {
    name: &'static str,
    lock: Mutex<()>,
}

impl BatchGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    pub fn try_run<R>(&self, job: impl FnOnce() -> R) -> Result<R, SkipReason> {
        match self.lock.try_lock() {
            Some(_held) => Ok(job()),
            None => {
                debug!("{} pass already running, dropping trigger", self.name);
                Err(SkipReason::AlreadyRunning)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock.is_locked()
    }
}
