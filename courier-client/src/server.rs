//! Server metadata endpoints

use crate::QueueClient;
use crate::error::Result;

impl QueueClient {
    /// Get the version string of the queue service
    ///
    /// Cheap call used to check that the service is reachable.
    pub async fn server_version(&self) -> Result<String> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        let version = self.handle_text_response(response).await?;
        Ok(version.trim().trim_matches('"').to_string())
    }
}
