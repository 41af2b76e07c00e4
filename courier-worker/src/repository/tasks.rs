//! Tasks repository
//!
//! Handles communication with the queue service for task operations:
//! - Fetching batches of tasks
//! - Reporting task results
//! - Reading the server version

use anyhow::{Context, Result};
use async_trait::async_trait;
use courier_client::QueueClient;
use courier_core::domain::task::Task;
use courier_core::domain::task_result::TaskResult;
use courier_core::dto::poll::BatchPollRequest;

use crate::config::Config;

/// Repository trait for task operations with the queue service
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Fetches up to `request.count` tasks of one type
    ///
    /// An empty vector means no work was available; it is not an error.
    async fn batch_poll(&self, request: &BatchPollRequest) -> Result<Vec<Task>>;

    /// Delivers the outcome of one execution
    ///
    /// # Arguments
    /// * `result` - The result to deliver
    async fn update_task(&self, result: &TaskResult) -> Result<()>;

    /// Returns the queue service version
    async fn server_version(&self) -> Result<String>;
}

/// HTTP implementation of TaskRepository
pub struct HttpTaskRepository {
    client: QueueClient,
}

impl HttpTaskRepository {
    /// Creates a new HTTP task repository
    ///
    /// # Arguments
    /// * `client` - Client for the queue service
    pub fn new(client: QueueClient) -> Self {
        Self { client }
    }

    /// Creates a repository for the service described by `config`
    pub fn from_config(config: &Config) -> Self {
        let client = QueueClient::new(config.server_url.clone());
        let client = match &config.auth_token {
            Some(token) => client.with_auth_token(token.clone()),
            None => client,
        };
        Self::new(client)
    }
}

#[async_trait]
impl TaskRepository for HttpTaskRepository {
    async fn batch_poll(&self, request: &BatchPollRequest) -> Result<Vec<Task>> {
        self.client
            .batch_poll(request)
            .await
            .with_context(|| format!("Failed to poll tasks of type {}", request.task_type))
    }

    async fn update_task(&self, result: &TaskResult) -> Result<()> {
        self.client
            .update_task(result)
            .await
            .with_context(|| format!("Failed to update task {}", result.task_id))?;

        Ok(())
    }

    async fn server_version(&self) -> Result<String> {
        self.client
            .server_version()
            .await
            .context("Failed to read queue service version")
    }
}
