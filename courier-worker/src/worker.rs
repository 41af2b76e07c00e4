//! Worker registration
//!
//! A [`Worker`] binds a task type to a handler together with the options the
//! runner applies when the worker is registered.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_core::domain::task::Task;
use courier_core::dto::poll::PollTimeout;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::context::TaskContext;
use crate::handler::{HandlerError, TaskHandler, TaskOutput, TypedHandler, handler_fn};

/// Default capacity of a newly registered worker
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Default sleep between empty polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-worker registration options
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Logical partition of the queue to poll
    pub domain: Option<String>,
    /// Capacity added to the task type on registration
    pub batch_size: usize,
    /// Sleep after an empty poll
    pub poll_interval: Duration,
    /// Per-type poll timeout; `None` keeps the runner default
    pub poll_timeout: Option<PollTimeout>,
    /// Extra token for handler contexts
    ///
    /// Handlers see cancellation when either this token or the runner's
    /// token fires.
    pub cancellation: Option<CancellationToken>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            domain: None,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: None,
            cancellation: None,
        }
    }
}

/// A handler bound to a task type
#[derive(Clone)]
pub struct Worker {
    task_type: String,
    handler: Arc<dyn TaskHandler>,
    options: WorkerOptions,
}

impl Worker {
    /// Creates a worker with default options
    pub fn new(task_type: impl Into<String>, handler: impl TaskHandler + 'static) -> Self {
        Self::from_arc(task_type, Arc::new(handler))
    }

    /// Creates a worker from a shared handler
    pub fn from_arc(task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            task_type: task_type.into(),
            handler,
            options: WorkerOptions::default(),
        }
    }

    /// Creates a worker from an async closure over the raw task
    pub fn from_fn<F, Fut>(task_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(TaskContext, Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, HandlerError>> + Send + 'static,
    {
        Self::new(task_type, handler_fn(f))
    }

    /// Creates a worker from an async closure over a typed input
    pub fn typed<I, O, F, Fut>(task_type: impl Into<String>, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(TaskContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
    {
        Self::new(task_type, TypedHandler::new(f))
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }

    /// Replaces all options
    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the capacity; zero is ignored
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.options.batch_size = batch_size;
        }
        self
    }

    /// Sets the poll interval; zero is ignored
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.options.poll_interval = interval;
        }
        self
    }

    pub fn with_poll_timeout(mut self, timeout: PollTimeout) -> Self {
        self.options.poll_timeout = Some(timeout);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.options.domain = (!domain.is_empty()).then_some(domain);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("task_type", &self.task_type)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Worker {
        Worker::from_fn("echo", |_ctx, task| async move {
            TaskOutput::completed(task.input_data)
        })
    }

    #[test]
    fn test_default_options() {
        let worker = echo();
        assert_eq!(worker.task_type(), "echo");
        assert_eq!(worker.options().batch_size, 1);
        assert_eq!(worker.options().poll_interval, Duration::from_millis(100));
        assert!(worker.options().poll_timeout.is_none());
        assert!(worker.options().domain.is_none());
    }

    #[test]
    fn test_builder_ignores_non_positive_values() {
        let worker = echo()
            .with_batch_size(0)
            .with_poll_interval(Duration::ZERO)
            .with_domain("");

        assert_eq!(worker.options().batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(worker.options().poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(worker.options().domain.is_none());
    }

    #[test]
    fn test_builder_applies_values() {
        let worker = echo()
            .with_batch_size(8)
            .with_poll_interval(Duration::from_secs(1))
            .with_poll_timeout(PollTimeout::from_millis(-1))
            .with_domain("blue");

        assert_eq!(worker.options().batch_size, 8);
        assert_eq!(worker.options().poll_interval, Duration::from_secs(1));
        assert_eq!(worker.options().poll_timeout, Some(PollTimeout::ServerDefault));
        assert_eq!(worker.options().domain.as_deref(), Some("blue"));
    }
}
