//! Task runner
//!
//! [`TaskRunner`] is the public control surface of the engine. It registers
//! workers, starts one poll loop per task type and exposes the lifecycle
//! operations: scaling, pausing, per-type shutdown, cancellation and waiting
//! for all outstanding work.
//!
//! Every runner owns its own registry, tracker and metrics; nothing is
//! process-global. Clones share the same engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use courier_core::dto::poll::PollTimeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::Config;
use crate::error::RunnerError;
use crate::handler::TaskHandler;
use crate::metrics::WorkerMetrics;
use crate::repository::TaskRepository;
use crate::scheduler::{
    Backoff, ConcurrencyTracker, SchedulerState, TaskTypeRegistry, spawn_poll_loop,
};
use crate::service::{RetryingReporter, StandardExecutionService};
use crate::worker::{Worker, WorkerOptions};

/// Polls, executes and reports tasks for every registered worker
#[derive(Clone)]
pub struct TaskRunner {
    state: Arc<SchedulerState>,
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("worker_id", &self.state.worker_id)
            .field("task_types", &self.state.registry.capacities())
            .field("cancelled", &self.state.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Creates a runner without checking that the queue service is reachable
    ///
    /// # Arguments
    /// * `repository` - Access to the queue service
    /// * `config` - Identity, default poll timeout and backoffs
    pub fn new(repository: Arc<dyn TaskRepository>, config: Config) -> Result<Self, RunnerError> {
        let metrics = WorkerMetrics::new()?;

        let executor = Arc::new(StandardExecutionService::new(
            config.worker_id.clone(),
            metrics.clone(),
        ));
        let reporter = Arc::new(RetryingReporter::new(
            Arc::clone(&repository),
            metrics.clone(),
        ));

        let state = SchedulerState {
            worker_id: config.worker_id.clone(),
            registry: TaskTypeRegistry::new(config.poll_timeout),
            tracker: Arc::new(ConcurrencyTracker::new()),
            tasks: TaskTracker::new(),
            backoff: Backoff::from_config(&config),
            repository,
            executor,
            reporter,
            metrics,
            cancellation: CancellationToken::new(),
        };

        Ok(Self {
            state: Arc::new(state),
        })
    }

    /// Creates a runner after checking that the queue service answers
    ///
    /// # Returns
    /// `RunnerError::Unreachable` if the version probe fails
    pub async fn connect(
        repository: Arc<dyn TaskRepository>,
        config: Config,
    ) -> Result<Self, RunnerError> {
        let version = repository
            .server_version()
            .await
            .map_err(RunnerError::Unreachable)?;

        info!(
            worker_id = %config.worker_id,
            server_url = %config.server_url,
            "Connected to queue service version {}",
            version
        );

        Self::new(repository, config)
    }

    pub fn worker_id(&self) -> &str {
        &self.state.worker_id
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a worker and starts polling for its task type
    ///
    /// Registering a task type again adds the new batch size to its capacity
    /// and replaces its handler, interval, timeout and domain. Must be called
    /// from within a tokio runtime.
    pub fn register_worker(&self, worker: Worker) -> Result<(), RunnerError> {
        let needs_loop = self.state.registry.register(&worker)?;
        let options = worker.options();

        info!(
            task_type = %worker.task_type(),
            batch_size = options.batch_size,
            domain = ?options.domain,
            "Started worker, poll interval {:?}",
            options.poll_interval
        );

        if needs_loop {
            spawn_poll_loop(Arc::clone(&self.state), worker.task_type().to_string());
        }
        Ok(())
    }

    /// Registers several workers, stopping at the first error
    pub fn register_workers(
        &self,
        workers: impl IntoIterator<Item = Worker>,
    ) -> Result<(), RunnerError> {
        workers
            .into_iter()
            .try_for_each(|worker| self.register_worker(worker))
    }

    /// Registers `handler` for `task_type`
    pub fn start_worker(
        &self,
        task_type: &str,
        handler: impl TaskHandler + 'static,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Result<(), RunnerError> {
        self.start_worker_with_domain(task_type, handler, batch_size, poll_interval, None)
    }

    /// Registers `handler` for `task_type`, polling only `domain`
    pub fn start_worker_with_domain(
        &self,
        task_type: &str,
        handler: impl TaskHandler + 'static,
        batch_size: usize,
        poll_interval: Duration,
        domain: Option<String>,
    ) -> Result<(), RunnerError> {
        let options = WorkerOptions {
            domain: domain.filter(|d| !d.is_empty()),
            batch_size,
            poll_interval,
            ..WorkerOptions::default()
        };
        self.register_worker(Worker::new(task_type, handler).with_options(options))
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.state.registry.is_registered(task_type)
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    /// Sets the maximum number of concurrent executions of `task_type`
    pub fn set_batch_size(&self, task_type: &str, batch_size: usize) -> Result<(), RunnerError> {
        let needs_loop = self.state.registry.set_capacity(task_type, batch_size)?;
        info!(task_type = %task_type, batch_size, "Set batch size");
        self.ensure_poll_loop(task_type, needs_loop);
        Ok(())
    }

    /// Raises the capacity of `task_type` by a positive `delta`
    pub fn increase_batch_size(&self, task_type: &str, delta: usize) -> Result<(), RunnerError> {
        let needs_loop = self.state.registry.increase_capacity(task_type, delta)?;
        info!(task_type = %task_type, delta, "Increased batch size");
        self.ensure_poll_loop(task_type, needs_loop);
        Ok(())
    }

    /// Lowers the capacity of `task_type` by a positive `delta`, clamping at zero
    ///
    /// At zero the poll loop keeps running but fetches nothing.
    pub fn decrease_batch_size(&self, task_type: &str, delta: usize) -> Result<(), RunnerError> {
        let batch_size = self.state.registry.decrease_capacity(task_type, delta)?;
        info!(task_type = %task_type, batch_size, "Decreased batch size");
        Ok(())
    }

    pub fn batch_size(&self, task_type: &str) -> Option<usize> {
        self.state.registry.capacity(task_type)
    }

    /// Capacities of every registered task type
    pub fn batch_sizes(&self) -> HashMap<String, usize> {
        self.state.registry.capacities()
    }

    /// Free slots of `task_type`
    ///
    /// Slots held by a poll that has not returned yet are not free.
    pub fn available(&self, task_type: &str) -> usize {
        self.state.tracker.available(&self.state.registry, task_type)
    }

    /// Slots of `task_type` in use
    ///
    /// Counts executions in flight plus slots reserved by a poll that has
    /// not returned yet. Reserved slots the poll does not fill are released
    /// as soon as it returns.
    pub fn running(&self, task_type: &str) -> usize {
        self.state.tracker.running(task_type)
    }

    fn ensure_poll_loop(&self, task_type: &str, needs_loop: bool) {
        if needs_loop {
            spawn_poll_loop(Arc::clone(&self.state), task_type.to_string());
        }
    }

    // =========================================================================
    // Polling parameters
    // =========================================================================

    pub fn set_poll_interval(&self, task_type: &str, interval: Duration) -> Result<(), RunnerError> {
        self.state.registry.set_poll_interval(task_type, interval)?;
        info!(task_type = %task_type, "Set poll interval to {:?}", interval);
        Ok(())
    }

    pub fn poll_interval(&self, task_type: &str) -> Option<Duration> {
        self.state.registry.poll_interval(task_type)
    }

    /// Sets the poll timeout of task types without their own override
    pub fn set_poll_timeout(&self, timeout: PollTimeout) {
        self.state.registry.set_default_poll_timeout(timeout);
        info!("Set default poll timeout to {:?}", timeout);
    }

    pub fn poll_timeout(&self) -> PollTimeout {
        self.state.registry.default_poll_timeout()
    }

    pub fn set_poll_timeout_for(
        &self,
        task_type: &str,
        timeout: PollTimeout,
    ) -> Result<(), RunnerError> {
        self.state.registry.set_poll_timeout(task_type, timeout)?;
        info!(task_type = %task_type, "Set poll timeout to {:?}", timeout);
        Ok(())
    }

    /// Effective poll timeout of `task_type`
    pub fn poll_timeout_for(&self, task_type: &str) -> Option<PollTimeout> {
        self.state.registry.poll_timeout(task_type)
    }

    /// Sets the backoff every poll loop uses after a failed poll
    pub fn set_sleep_on_generic_error(&self, duration: Duration) {
        self.state.backoff.set_generic_error(duration);
    }

    pub fn sleep_on_generic_error(&self) -> Duration {
        self.state.backoff.generic_error()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stops fetching tasks of `task_type`; executions in flight continue
    pub fn pause(&self, task_type: &str) {
        self.state.registry.pause(task_type);
        info!(task_type = %task_type, "Paused worker");
    }

    pub fn resume(&self, task_type: &str) {
        self.state.registry.resume(task_type);
        info!(task_type = %task_type, "Resumed worker");
    }

    pub fn is_paused(&self, task_type: &str) -> bool {
        self.state.registry.is_paused(task_type)
    }

    /// Unregisters `task_type`
    ///
    /// Its poll loop exits at its next iteration. Executions in flight finish
    /// and still report their results.
    pub fn shutdown(&self, task_type: &str) -> Result<(), RunnerError> {
        if !self.state.registry.unregister(task_type) {
            return Err(RunnerError::UnknownTaskType(task_type.to_string()));
        }
        info!(task_type = %task_type, "Shut down worker");
        Ok(())
    }

    /// Fires the shared cancellation signal
    ///
    /// Poll loops stop fetching and exit; handlers observe the signal through
    /// their context. Results already computed are still reported.
    pub fn cancel(&self) {
        info!("Cancelling task runner");
        self.state.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancellation.clone()
    }

    /// Completes once every poll loop and every execution has finished
    ///
    /// Loops and executions started later are still waited on by later calls.
    pub async fn wait_all(&self) {
        self.state.tasks.close();
        self.state.tasks.wait().await;
    }

    pub fn metrics(&self) -> &WorkerMetrics {
        &self.state.metrics
    }
}
