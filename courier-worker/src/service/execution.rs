//! Execution service
//!
//! Runs one task through its handler and always produces a [`TaskResult`]:
//! - handler output becomes COMPLETED or IN_PROGRESS
//! - handler errors become FAILED, or FAILED_WITH_TERMINAL_ERROR when terminal
//! - handler panics are caught and become FAILED with the panic message
//!
//! Execution time is recorded per task type.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::domain::task::Task;
use courier_core::domain::task_result::TaskResult;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::TaskContext;
use crate::handler::{HandlerError, TaskHandler, TaskOutput};
use crate::metrics::WorkerMetrics;

/// Service trait for executing tasks
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes `task` with `handler`
    ///
    /// # Arguments
    /// * `handler` - Handler registered for the task type
    /// * `task` - The task as received from the queue
    /// * `cancellation` - Token the handler observes through its context
    ///
    /// # Returns
    /// The result to report; never fails
    async fn execute(
        &self,
        handler: Arc<dyn TaskHandler>,
        task: Task,
        cancellation: CancellationToken,
    ) -> TaskResult;
}

/// Standard implementation of ExecutionService
pub struct StandardExecutionService {
    worker_id: String,
    metrics: WorkerMetrics,
}

impl StandardExecutionService {
    /// Creates a new execution service
    ///
    /// # Arguments
    /// * `worker_id` - Identity stamped on every result
    /// * `metrics` - Sink for execution time and failures
    pub fn new(worker_id: impl Into<String>, metrics: WorkerMetrics) -> Self {
        Self {
            worker_id: worker_id.into(),
            metrics,
        }
    }
}

#[async_trait]
impl ExecutionService for StandardExecutionService {
    async fn execute(
        &self,
        handler: Arc<dyn TaskHandler>,
        task: Task,
        cancellation: CancellationToken,
    ) -> TaskResult {
        let task_type = task.definition_name().to_string();
        let ctx = TaskContext::new(&task, cancellation);

        debug!(
            task_type = %task_type,
            task_id = %task.task_id,
            workflow_id = %task.workflow_instance_id,
            "Executing task"
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.execute(ctx.clone(), task.clone()))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(Ok(TaskOutput::Completed(output))) => TaskResult::completed(&task, output),
            Ok(Ok(TaskOutput::InProgress {
                output,
                callback_after,
            })) => {
                let seconds = i64::try_from(callback_after.as_secs()).unwrap_or(i64::MAX);
                TaskResult::in_progress(&task, output, seconds)
            }
            Ok(Err(err)) => {
                warn!(
                    task_type = %task_type,
                    task_id = %task.task_id,
                    "Task failed: {}",
                    err
                );
                failure(&task, &err)
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                warn!(
                    task_type = %task_type,
                    task_id = %task.task_id,
                    "Handler panicked: {}",
                    message
                );
                TaskResult::failed(&task, format!("handler panicked: {}", message))
            }
        };

        self.metrics
            .record_execution(&task_type, elapsed, result.status.is_failure());

        debug!(
            task_type = %task_type,
            task_id = %task.task_id,
            status = ?result.status,
            "Task executed in {:?}",
            elapsed
        );

        result
            .with_worker_id(self.worker_id.clone())
            .with_logs(ctx.drain_logs())
    }
}

fn failure(task: &Task, err: &HandlerError) -> TaskResult {
    if err.is_terminal() {
        TaskResult::failed_terminal(task, err.to_string())
    } else {
        TaskResult::failed(task, err.to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use courier_core::domain::task_result::TaskResultStatus;
    use serde_json::{Map, json};
    use std::time::Duration;

    fn service() -> (StandardExecutionService, WorkerMetrics) {
        let metrics = WorkerMetrics::new().unwrap();
        (StandardExecutionService::new("worker-1", metrics.clone()), metrics)
    }

    fn task() -> Task {
        let input = json!({"name": "Ada"}).as_object().unwrap().clone();
        Task::new("echo", "t-1", "wf-1", input)
    }

    async fn run(handler: impl TaskHandler + 'static) -> TaskResult {
        let (service, _) = service();
        service
            .execute(Arc::new(handler), task(), CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_completed_output_and_logs() {
        let (service, metrics) = service();
        let handler = handler_fn(|ctx: TaskContext, task: Task| async move {
            ctx.log("echoing");
            TaskOutput::completed(task.input_data)
        });

        let result = service
            .execute(Arc::new(handler), task(), CancellationToken::new())
            .await;

        assert_eq!(result.status, TaskResultStatus::Completed);
        assert_eq!(result.output_data.unwrap()["name"], "Ada");
        assert_eq!(result.worker_id.as_deref(), Some("worker-1"));
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].log, "echoing");
        assert_eq!(metrics.execution_count("echo"), 1);
    }

    #[tokio::test]
    async fn test_handler_errors_map_to_failure_statuses() {
        let failed = run(handler_fn(|_ctx, _task| async move {
            Err::<TaskOutput, _>(HandlerError::failed("downstream timeout"))
        }))
        .await;
        assert_eq!(failed.status, TaskResultStatus::Failed);
        assert_eq!(failed.reason_for_incompletion.as_deref(), Some("downstream timeout"));

        let terminal = run(handler_fn(|_ctx, _task| async move {
            Err::<TaskOutput, _>(HandlerError::terminal("bad input"))
        }))
        .await;
        assert_eq!(terminal.status, TaskResultStatus::FailedWithTerminalError);
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let (service, metrics) = service();
        let handler = handler_fn(|_ctx, task: Task| async move {
            if task.task_id == "t-1" {
                panic!("index out of bounds");
            }
            TaskOutput::completed(Map::new())
        });

        let result = service
            .execute(Arc::new(handler), task(), CancellationToken::new())
            .await;

        assert_eq!(result.status, TaskResultStatus::Failed);
        let reason = result.reason_for_incompletion.unwrap();
        assert!(reason.contains("handler panicked"));
        assert!(reason.contains("index out of bounds"));
        assert_eq!(metrics.execution_count("echo"), 1);
    }

    #[tokio::test]
    async fn test_in_progress_carries_callback() {
        let result = run(handler_fn(|_ctx, _task| async move {
            TaskOutput::in_progress(json!({"step": 1}), Duration::from_secs(30))
        }))
        .await;

        assert_eq!(result.status, TaskResultStatus::InProgress);
        assert_eq!(result.callback_after_seconds, 30);
        assert_eq!(result.output_data.unwrap()["step"], 1);
    }

    #[tokio::test]
    async fn test_handler_observes_cancellation() {
        let (service, _) = service();
        let token = CancellationToken::new();
        token.cancel();

        let handler = handler_fn(|ctx: TaskContext, _task| async move {
            ctx.cancelled().await;
            Err::<TaskOutput, _>(HandlerError::failed("cancelled"))
        });

        let result = service.execute(Arc::new(handler), task(), token).await;
        assert_eq!(result.reason_for_incompletion.as_deref(), Some("cancelled"));
    }
}
