//! Error types for the worker engine

use thiserror::Error;

/// Errors returned synchronously by registration and control calls
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A worker was registered without a task type
    #[error("task type cannot be empty")]
    EmptyTaskType,

    /// The task type has no registered worker
    #[error("no worker registered for task type {0}")]
    UnknownTaskType(String),

    /// A capacity or capacity delta was out of range
    #[error("invalid batch size for task type {task_type}: {reason}")]
    InvalidBatchSize { task_type: String, reason: String },

    /// The queue service could not be reached at startup
    #[error("queue service unreachable: {0:#}")]
    Unreachable(anyhow::Error),

    /// Metric registration failed
    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl RunnerError {
    pub(crate) fn invalid_batch_size(task_type: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBatchSize {
            task_type: task_type.to_string(),
            reason: reason.into(),
        }
    }
}
