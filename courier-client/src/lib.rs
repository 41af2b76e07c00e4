//! Courier HTTP Client
//!
//! A small, type-safe HTTP client for the remote task-queue service.
//!
//! The worker engine only needs three calls from the service: fetching a batch
//! of tasks, reporting a task result, and reading the server version to check
//! reachability at startup.
//!
//! # Example
//!
//! ```no_run
//! use courier_client::QueueClient;
//! use courier_core::dto::poll::{BatchPollRequest, PollTimeout};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = QueueClient::new("http://localhost:8080");
//!
//!     let tasks = client
//!         .batch_poll(&BatchPollRequest {
//!             task_type: "echo".to_string(),
//!             count: 5,
//!             domain: None,
//!             timeout: PollTimeout::ServerDefault,
//!             worker_id: "worker-1".to_string(),
//!         })
//!         .await?;
//!
//!     println!("Fetched {} task(s)", tasks.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod server;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

/// Header carrying the access token expected by the queue service
pub const AUTH_HEADER: &str = "X-Authorization";

/// HTTP client for the task-queue service API
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct QueueClient {
    /// Base URL of the service (e.g., "http://localhost:8080")
    base_url: String,
    /// Access token sent with every request, if any
    auth_token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl QueueClient {
    /// Create a new queue client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the service (e.g., "http://localhost:8080")
    ///
    /// # Example
    /// ```
    /// use courier_client::QueueClient;
    ///
    /// let client = QueueClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new queue client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    /// Long polls hold the connection open for the poll timeout, so a request
    /// timeout shorter than that turns every idle poll into an error.
    ///
    /// # Example
    /// ```
    /// use courier_client::QueueClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = QueueClient::with_client("http://localhost:8080", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            client,
        }
    }

    /// Send `token` in the [`AUTH_HEADER`] header of every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header(AUTH_HEADER, token),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Fail with [`ClientError::ApiError`] unless the response is a success
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Deserialize a JSON body, treating "no content" as `None`
    async fn handle_optional_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        let response = self.check_status(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Read a plain-text body
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let response = self.check_status(response).await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = QueueClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = QueueClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = QueueClient::with_client("http://localhost:8080", http_client)
            .with_auth_token("secret");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.auth_token.as_deref(), Some("secret"));
    }
}
