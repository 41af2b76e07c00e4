//! Task-related API endpoints

use courier_core::domain::task::Task;
use courier_core::domain::task_result::TaskResult;
use courier_core::dto::poll::BatchPollRequest;
use tracing::debug;

use crate::QueueClient;
use crate::error::{ClientError, Result};

impl QueueClient {
    // =============================================================================
    // Polling
    // =============================================================================

    /// Fetch up to `request.count` tasks of one type
    ///
    /// A "no content" response is an empty batch, not an error.
    ///
    /// # Arguments
    /// * `request` - Task type, batch size, optional domain and poll timeout
    ///
    /// # Returns
    /// The fetched tasks, possibly none
    pub async fn batch_poll(&self, request: &BatchPollRequest) -> Result<Vec<Task>> {
        if request.task_type.is_empty() {
            return Err(ClientError::InvalidRequest(
                "task type must not be empty".to_string(),
            ));
        }

        let url = format!(
            "{}/api/tasks/poll/batch/{}",
            self.base_url, request.task_type
        );

        let mut query = vec![
            ("workerid", request.worker_id.clone()),
            ("count", request.count.to_string()),
        ];
        if let Some(timeout) = request.timeout.as_millis() {
            query.push(("timeout", timeout.to_string()));
        }
        if let Some(domain) = request.domain.as_ref().filter(|d| !d.is_empty()) {
            query.push(("domain", domain.clone()));
        }

        let response = self
            .authorize(self.client.get(&url).query(&query))
            .send()
            .await?;

        let tasks: Vec<Task> = self
            .handle_optional_response(response)
            .await?
            .unwrap_or_default();

        debug!(
            task_type = %request.task_type,
            count = tasks.len(),
            "Polled tasks"
        );

        Ok(tasks)
    }

    // =============================================================================
    // Results
    // =============================================================================

    /// Report the outcome of an execution
    ///
    /// # Arguments
    /// * `result` - The result to deliver
    ///
    /// # Returns
    /// The acknowledgement body sent back by the service (the task id)
    pub async fn update_task(&self, result: &TaskResult) -> Result<String> {
        let url = format!("{}/api/tasks", self.base_url);
        let response = self
            .authorize(self.client.post(&url).json(result))
            .send()
            .await?;

        self.handle_text_response(response).await
    }
}
