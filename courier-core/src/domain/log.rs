//! Execution log types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A log line produced while a task was executing
///
/// Attached to the [`TaskResult`](crate::domain::task_result::TaskResult) so the
/// queue service can show it next to the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecLog {
    pub log: String,
    pub task_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_time: DateTime<Utc>,
}

impl TaskExecLog {
    /// Creates a log line stamped with the current time
    pub fn new(task_id: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            task_id: task_id.into(),
            created_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_time_serialized_as_epoch_millis() {
        let entry = TaskExecLog {
            log: "hello".to_string(),
            task_id: "t-1".to_string(),
            created_time: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["createdTime"], 1_700_000_000_123_i64);
        assert_eq!(json["taskId"], "t-1");
    }
}
