//! Task domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work handed out by the task queue
///
/// Created by the queue service and received through a batch poll. The engine
/// never mutates a task; it is dropped once its result has been reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub task_type: String,
    pub task_def_name: Option<String>,
    pub task_id: String,
    pub workflow_instance_id: String,
    pub workflow_type: Option<String>,
    pub input_data: Map<String, Value>,
    pub retry_count: u32,
    pub poll_count: u32,
    pub retried_task_id: Option<String>,
    pub status: Option<String>,
    pub callback_after_seconds: i64,
    pub response_timeout_seconds: i64,
    pub domain: Option<String>,
}

impl Task {
    /// Creates a task with the given identity and input
    pub fn new(
        task_type: impl Into<String>,
        task_id: impl Into<String>,
        workflow_instance_id: impl Into<String>,
        input_data: Map<String, Value>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            task_id: task_id.into(),
            workflow_instance_id: workflow_instance_id.into(),
            input_data,
            ..Default::default()
        }
    }

    /// Name of the task definition, falling back to the task type
    pub fn definition_name(&self) -> &str {
        self.task_def_name.as_deref().unwrap_or(&self.task_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_queue_payload() {
        let payload = json!({
            "taskType": "echo",
            "taskDefName": "echo",
            "taskId": "a1",
            "workflowInstanceId": "wf-9",
            "inputData": {"message": "hi"},
            "retryCount": 2,
            "pollCount": 5,
            "status": "IN_PROGRESS",
            "someFieldWeDoNotModel": true
        });

        let task: Task = serde_json::from_value(payload).unwrap();
        assert_eq!(task.task_type, "echo");
        assert_eq!(task.task_id, "a1");
        assert_eq!(task.workflow_instance_id, "wf-9");
        assert_eq!(task.input_data["message"], "hi");
        assert_eq!(task.retry_count, 2);
        assert_eq!(task.poll_count, 5);
        assert!(task.workflow_type.is_none());
    }

    #[test]
    fn test_definition_name_falls_back_to_type() {
        let mut task = Task::new("echo", "a1", "wf", Map::new());
        assert_eq!(task.definition_name(), "echo");

        task.task_def_name = Some("echo_v2".to_string());
        assert_eq!(task.definition_name(), "echo_v2");
    }
}
