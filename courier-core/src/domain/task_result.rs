//! Task result domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::log::TaskExecLog;
use crate::domain::task::Task;

/// Status reported back to the queue for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResultStatus {
    Completed,
    Failed,
    FailedWithTerminalError,
    InProgress,
}

impl TaskResultStatus {
    /// Whether the status marks a failed execution
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::FailedWithTerminalError)
    }
}

/// Outcome of executing a single task
///
/// Built once by the execution wrapper and sent as-is by the reporter; a retry
/// re-sends the identical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub workflow_instance_id: String,
    pub status: TaskResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_for_incompletion: Option<String>,
    #[serde(default)]
    pub callback_after_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<TaskExecLog>,
}

impl TaskResult {
    fn for_task(task: &Task, status: TaskResultStatus) -> Self {
        Self {
            task_id: task.task_id.clone(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            status,
            output_data: None,
            reason_for_incompletion: None,
            callback_after_seconds: 0,
            worker_id: None,
            logs: Vec::new(),
        }
    }

    /// A successful execution carrying the handler output
    pub fn completed(task: &Task, output: Map<String, Value>) -> Self {
        Self {
            output_data: Some(output),
            ..Self::for_task(task, TaskResultStatus::Completed)
        }
    }

    /// A failed execution; the queue may retry the task
    pub fn failed(task: &Task, reason: impl Into<String>) -> Self {
        Self {
            reason_for_incompletion: Some(reason.into()),
            ..Self::for_task(task, TaskResultStatus::Failed)
        }
    }

    /// A failed execution that the queue must not retry
    pub fn failed_terminal(task: &Task, reason: impl Into<String>) -> Self {
        Self {
            reason_for_incompletion: Some(reason.into()),
            ..Self::for_task(task, TaskResultStatus::FailedWithTerminalError)
        }
    }

    /// Work is still ongoing; the queue re-offers the task after `callback_after_seconds`
    pub fn in_progress(
        task: &Task,
        output: Map<String, Value>,
        callback_after_seconds: i64,
    ) -> Self {
        Self {
            output_data: Some(output),
            callback_after_seconds,
            ..Self::for_task(task, TaskResultStatus::InProgress)
        }
    }

    /// Sets the identity of the worker reporting the result
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Attaches execution logs
    pub fn with_logs(mut self, logs: Vec<TaskExecLog>) -> Self {
        self.logs = logs;
        self
    }
}
