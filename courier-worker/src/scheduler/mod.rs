//! Scheduler layer for the engine
//!
//! This layer owns the shared runtime state of one engine instance and the
//! per-type poll loops that drive it. It reserves capacity, fetches batches
//! and hands every task to the service layer.

pub mod poller;
pub mod registry;
pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::metrics::WorkerMetrics;
use crate::repository::TaskRepository;
use crate::service::{ExecutionService, ResultReporter};

pub use poller::spawn_poll_loop;
pub use registry::{TaskTypeConfig, TaskTypeRegistry};
pub use tracker::{ConcurrencyTracker, Permit};

/// Backoffs shared by every poll loop
pub struct Backoff {
    generic_error: RwLock<Duration>,
    no_capacity: Duration,
    paused: Duration,
}

impl Backoff {
    pub fn from_config(config: &Config) -> Self {
        Self {
            generic_error: RwLock::new(config.sleep_on_generic_error),
            no_capacity: config.sleep_on_no_capacity,
            paused: config.sleep_on_paused,
        }
    }

    pub fn generic_error(&self) -> Duration {
        *self.generic_error.read()
    }

    pub fn set_generic_error(&self, duration: Duration) {
        *self.generic_error.write() = duration;
    }

    pub fn no_capacity(&self) -> Duration {
        self.no_capacity
    }

    pub fn paused(&self) -> Duration {
        self.paused
    }
}

/// State shared by the runner, its poll loops and its executions
pub struct SchedulerState {
    pub worker_id: String,
    pub registry: TaskTypeRegistry,
    pub tracker: Arc<ConcurrencyTracker>,
    /// Every poll loop and every execution runs on this tracker
    pub tasks: TaskTracker,
    pub backoff: Backoff,
    pub repository: Arc<dyn TaskRepository>,
    pub executor: Arc<dyn ExecutionService>,
    pub reporter: Arc<dyn ResultReporter>,
    pub metrics: WorkerMetrics,
    pub cancellation: CancellationToken,
}
