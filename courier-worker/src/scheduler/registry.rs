//! Task type registry
//!
//! Holds the mutable per-type configuration of one engine instance: capacity,
//! poll interval, poll timeout override, domain, handler and the paused flag.
//! It also tracks which task types currently have a live poll loop so that at
//! most one loop runs per type.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use courier_core::dto::poll::PollTimeout;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::handler::TaskHandler;
use crate::worker::Worker;

/// Runtime configuration of one task type
#[derive(Clone)]
pub struct TaskTypeConfig {
    pub capacity: usize,
    pub poll_interval: Duration,
    /// Per-type override; `None` uses the registry default
    pub poll_timeout: Option<PollTimeout>,
    pub domain: Option<String>,
    pub handler: Arc<dyn TaskHandler>,
    /// Extra token for handler contexts, if the worker brought its own
    pub cancellation: Option<CancellationToken>,
}

/// Registry of task types for one engine instance
pub struct TaskTypeRegistry {
    configs: RwLock<HashMap<String, TaskTypeConfig>>,
    paused: RwLock<HashSet<String>>,
    resumed: Notify,
    default_poll_timeout: RwLock<PollTimeout>,
    loops: Mutex<HashSet<String>>,
}

impl TaskTypeRegistry {
    pub fn new(default_poll_timeout: PollTimeout) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            paused: RwLock::new(HashSet::new()),
            resumed: Notify::new(),
            default_poll_timeout: RwLock::new(default_poll_timeout),
            loops: Mutex::new(HashSet::new()),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers `worker` or adds its batch size to an existing registration
    ///
    /// Re-registration replaces handler, interval, timeout, domain and
    /// cancellation token.
    ///
    /// # Returns
    /// `true` when the caller must spawn a poll loop for the task type
    pub fn register(&self, worker: &Worker) -> Result<bool, RunnerError> {
        let name = worker.task_type();
        if name.is_empty() {
            return Err(RunnerError::EmptyTaskType);
        }

        let options = worker.options();
        if options.batch_size == 0 {
            return Err(RunnerError::invalid_batch_size(name, "batch size must be positive"));
        }

        let mut configs = self.configs.write();
        let capacity = configs
            .get(name)
            .map_or(0, |existing| existing.capacity)
            .saturating_add(options.batch_size);

        configs.insert(
            name.to_string(),
            TaskTypeConfig {
                capacity,
                poll_interval: options.poll_interval,
                poll_timeout: options.poll_timeout,
                domain: options.domain.clone(),
                handler: worker.handler(),
                cancellation: options.cancellation.clone(),
            },
        );

        Ok(self.claim_loop(name))
    }

    /// Removes every piece of state for `name`
    ///
    /// Returns `false` if the task type was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.configs.write().remove(name).is_some();
        self.paused.write().remove(name);
        removed
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.configs.read().contains_key(name)
    }

    /// Copy of the configuration of `name`
    pub fn snapshot(&self, name: &str) -> Option<TaskTypeConfig> {
        self.configs.read().get(name).cloned()
    }

    /// Runs `f` on the capacity of `name` while holding the configuration lock
    ///
    /// Capacity cannot change until `f` returns, so callers may combine it
    /// with other state in one consistent step.
    pub fn with_capacity<R>(&self, name: &str, f: impl FnOnce(usize) -> R) -> Option<R> {
        let configs = self.configs.read();
        configs.get(name).map(|config| f(config.capacity))
    }

    // =========================================================================
    // Poll loop ownership
    // =========================================================================

    /// Marks a poll loop as live for `name`; `false` if one already is
    fn claim_loop(&self, name: &str) -> bool {
        self.loops.lock().insert(name.to_string())
    }

    /// Releases the loop slot of `name` if the type is no longer registered
    ///
    /// Called by a poll loop that found no configuration. Returns `true` when
    /// the loop must exit; `false` means the type was registered again in the
    /// meantime and the loop keeps running.
    pub fn retire_loop(&self, name: &str) -> bool {
        let configs = self.configs.read();
        if configs.contains_key(name) {
            return false;
        }
        self.loops.lock().remove(name);
        true
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    pub fn capacity(&self, name: &str) -> Option<usize> {
        self.configs.read().get(name).map(|config| config.capacity)
    }

    /// Capacities of every registered task type
    pub fn capacities(&self) -> HashMap<String, usize> {
        self.configs
            .read()
            .iter()
            .map(|(name, config)| (name.clone(), config.capacity))
            .collect()
    }

    /// Sets the capacity of `name`
    ///
    /// # Returns
    /// `true` when the caller must spawn a poll loop for the task type
    pub fn set_capacity(&self, name: &str, capacity: usize) -> Result<bool, RunnerError> {
        self.update(name, |config| config.capacity = capacity)?;
        Ok(capacity > 0 && self.claim_loop(name))
    }

    /// Adds `delta` to the capacity of `name`; `delta` must be positive
    ///
    /// # Returns
    /// `true` when the caller must spawn a poll loop for the task type
    pub fn increase_capacity(&self, name: &str, delta: usize) -> Result<bool, RunnerError> {
        if delta == 0 {
            return Err(RunnerError::invalid_batch_size(name, "increase must be positive"));
        }
        self.update(name, |config| {
            config.capacity = config.capacity.saturating_add(delta);
        })?;
        Ok(self.claim_loop(name))
    }

    /// Subtracts `delta` from the capacity of `name`, clamping at zero
    ///
    /// A capacity of zero starves the poll loop without stopping it.
    pub fn decrease_capacity(&self, name: &str, delta: usize) -> Result<usize, RunnerError> {
        if delta == 0 {
            return Err(RunnerError::invalid_batch_size(name, "decrease must be positive"));
        }
        self.update(name, |config| {
            config.capacity = config.capacity.saturating_sub(delta);
            config.capacity
        })
    }

    // =========================================================================
    // Poll interval and timeout
    // =========================================================================

    pub fn set_poll_interval(&self, name: &str, interval: Duration) -> Result<(), RunnerError> {
        self.update(name, |config| config.poll_interval = interval)
    }

    pub fn poll_interval(&self, name: &str) -> Option<Duration> {
        self.configs.read().get(name).map(|config| config.poll_interval)
    }

    pub fn set_default_poll_timeout(&self, timeout: PollTimeout) {
        *self.default_poll_timeout.write() = timeout;
    }

    pub fn default_poll_timeout(&self) -> PollTimeout {
        *self.default_poll_timeout.read()
    }

    pub fn set_poll_timeout(&self, name: &str, timeout: PollTimeout) -> Result<(), RunnerError> {
        self.update(name, |config| config.poll_timeout = Some(timeout))
    }

    /// Effective poll timeout of `name`, falling back to the default
    pub fn poll_timeout(&self, name: &str) -> Option<PollTimeout> {
        let override_timeout = self.configs.read().get(name)?.poll_timeout;
        Some(override_timeout.unwrap_or_else(|| self.default_poll_timeout()))
    }

    // =========================================================================
    // Pause
    // =========================================================================

    pub fn pause(&self, name: &str) {
        self.paused.write().insert(name.to_string());
    }

    /// Clears the paused flag and wakes loops sleeping on [`Self::resumed`]
    pub fn resume(&self, name: &str) {
        if self.paused.write().remove(name) {
            self.resumed.notify_waiters();
        }
    }

    /// Completes on the next [`Self::resume`] that clears a paused flag
    ///
    /// Call `enable` on the returned future before checking [`Self::is_paused`]
    /// so that a resume landing in between is not missed.
    pub fn resumed(&self) -> Notified<'_> {
        self.resumed.notified()
    }

    pub fn is_paused(&self, name: &str) -> bool {
        self.paused.read().contains(name)
    }

    fn update<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut TaskTypeConfig) -> R,
    ) -> Result<R, RunnerError> {
        let mut configs = self.configs.write();
        let config = configs
            .get_mut(name)
            .ok_or_else(|| RunnerError::UnknownTaskType(name.to_string()))?;
        Ok(f(config))
    }
}
