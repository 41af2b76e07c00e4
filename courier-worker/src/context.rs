//! Execution context for task handlers
//!
//! Contains everything a handler may need besides its input:
//! - Task and workflow metadata
//! - A cancellation token tied to the engine's shutdown signal
//! - A log buffer whose entries are reported alongside the result

use std::sync::Arc;

use courier_core::domain::log::TaskExecLog;
use courier_core::domain::task::Task;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Execution context handed to a handler for one task
///
/// Cloning is cheap; clones share the log buffer.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: String,
    task_type: String,
    workflow_instance_id: String,
    workflow_type: Option<String>,
    retry_count: u32,
    retried_task_id: Option<String>,
    poll_count: u32,
    cancellation: CancellationToken,
    logs: Arc<Mutex<Vec<TaskExecLog>>>,
}

impl TaskContext {
    /// Creates a context for `task`
    ///
    /// # Arguments
    /// * `task` - The task being executed
    /// * `cancellation` - Token the handler observes to stop cooperatively
    pub fn new(task: &Task, cancellation: CancellationToken) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_type: task.definition_name().to_string(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            workflow_type: task.workflow_type.clone(),
            retry_count: task.retry_count,
            retried_task_id: task.retried_task_id.clone(),
            poll_count: task.poll_count,
            cancellation,
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn workflow_instance_id(&self) -> &str {
        &self.workflow_instance_id
    }

    pub fn workflow_type(&self) -> Option<&str> {
        self.workflow_type.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retried_task_id(&self) -> Option<&str> {
        self.retried_task_id.as_deref()
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    /// Token cancelled when the engine shuts down
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the engine asked the handler to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the engine asks the handler to stop
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Appends a line to the execution log reported with the result
    pub fn log(&self, message: impl Into<String>) {
        self.logs
            .lock()
            .push(TaskExecLog::new(self.task_id.clone(), message));
    }

    /// Drains all log entries from the buffer
    ///
    /// Returns all buffered entries and clears the buffer
    pub fn drain_logs(&self) -> Vec<TaskExecLog> {
        self.logs.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_context_exposes_task_metadata() {
        let mut task = Task::new("echo", "t-1", "wf-1", Map::new());
        task.retry_count = 3;
        task.poll_count = 4;
        task.workflow_type = Some("onboarding".to_string());

        let ctx = TaskContext::new(&task, CancellationToken::new());
        assert_eq!(ctx.task_id(), "t-1");
        assert_eq!(ctx.task_type(), "echo");
        assert_eq!(ctx.workflow_instance_id(), "wf-1");
        assert_eq!(ctx.workflow_type(), Some("onboarding"));
        assert_eq!(ctx.retry_count(), 3);
        assert_eq!(ctx.poll_count(), 4);
    }

    #[test]
    fn test_clones_share_log_buffer() {
        let task = Task::new("echo", "t-1", "wf-1", Map::new());
        let ctx = TaskContext::new(&task, CancellationToken::new());
        let clone = ctx.clone();

        ctx.log("first");
        clone.log("second");

        let logs = ctx.drain_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].log, "second");
        assert_eq!(logs[0].task_id, "t-1");
        assert!(clone.drain_logs().is_empty());
    }

    #[test]
    fn test_cancellation_is_observable() {
        let task = Task::new("echo", "t-1", "wf-1", Map::new());
        let token = CancellationToken::new();
        let ctx = TaskContext::new(&task, token.child_token());

        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
