//! Worker configuration
//!
//! Defines the runner-wide parameters: identity, queue service connection,
//! default poll timeout and the backoffs used by every poll loop.

use std::time::Duration;

use courier_core::dto::poll::PollTimeout;

use crate::worker::{DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL};

/// Default backoff after a failed poll
pub const DEFAULT_SLEEP_ON_GENERIC_ERROR: Duration = Duration::from_millis(200);

/// Default backoff when every slot of a task type is busy
pub const DEFAULT_SLEEP_ON_NO_CAPACITY: Duration = Duration::from_millis(10);

/// Default backoff while a task type is paused
pub const DEFAULT_SLEEP_ON_PAUSED: Duration = Duration::from_millis(200);

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity sent with every poll call
    pub worker_id: String,

    /// Task-queue service base URL (e.g., "http://localhost:8080")
    pub server_url: String,

    /// Access token for the queue service, if it requires one
    pub auth_token: Option<String>,

    /// Poll timeout used by task types without their own override
    pub poll_timeout: PollTimeout,

    /// How long a poll loop sleeps after a failed poll
    pub sleep_on_generic_error: Duration,

    /// How long a poll loop sleeps when no capacity is available
    pub sleep_on_no_capacity: Duration,

    /// How long a poll loop sleeps between checks while paused
    pub sleep_on_paused: Duration,

    /// Capacity of the workers started by the binary
    pub batch_size: usize,

    /// Poll interval of the workers started by the binary
    pub poll_interval: Duration,

    /// Domain of the workers started by the binary
    pub domain: Option<String>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_id: String, server_url: String) -> Self {
        Self {
            worker_id,
            server_url,
            auth_token: None,
            poll_timeout: PollTimeout::ServerDefault,
            sleep_on_generic_error: DEFAULT_SLEEP_ON_GENERIC_ERROR,
            sleep_on_no_capacity: DEFAULT_SLEEP_ON_NO_CAPACITY,
            sleep_on_paused: DEFAULT_SLEEP_ON_PAUSED,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            domain: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WORKER_ID (optional, default: random)
    /// - QUEUE_SERVER_URL (optional, default: http://localhost:8080)
    /// - QUEUE_AUTH_TOKEN (optional)
    /// - POLL_TIMEOUT_MS (optional, negative = server default, default: -1)
    /// - SLEEP_ON_GENERIC_ERROR_MS (optional, default: 200)
    /// - SLEEP_ON_NO_CAPACITY_MS (optional, default: 10)
    /// - SLEEP_ON_PAUSED_MS (optional, default: 200)
    /// - WORKER_BATCH_SIZE (optional, default: 1)
    /// - WORKER_POLL_INTERVAL_MS (optional, default: 100)
    /// - WORKER_DOMAIN (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let poll_timeout = lookup("POLL_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(PollTimeout::from_millis)
            .unwrap_or(defaults.poll_timeout);

        let batch_size = lookup("WORKER_BATCH_SIZE")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(defaults.batch_size);

        Ok(Self {
            worker_id: non_empty("WORKER_ID").unwrap_or(defaults.worker_id),
            server_url: non_empty("QUEUE_SERVER_URL").unwrap_or(defaults.server_url),
            auth_token: non_empty("QUEUE_AUTH_TOKEN"),
            poll_timeout,
            sleep_on_generic_error: millis("SLEEP_ON_GENERIC_ERROR_MS", defaults.sleep_on_generic_error),
            sleep_on_no_capacity: millis("SLEEP_ON_NO_CAPACITY_MS", defaults.sleep_on_no_capacity),
            sleep_on_paused: millis("SLEEP_ON_PAUSED_MS", defaults.sleep_on_paused),
            batch_size,
            poll_interval: millis("WORKER_POLL_INTERVAL_MS", defaults.poll_interval),
            domain: non_empty("WORKER_DOMAIN"),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.server_url.is_empty() {
            anyhow::bail!("server_url cannot be empty");
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            anyhow::bail!("server_url must start with http:// or https://");
        }

        if self.sleep_on_generic_error.is_zero() {
            anyhow::bail!("sleep_on_generic_error must be greater than 0");
        }

        if self.sleep_on_no_capacity.is_zero() {
            anyhow::bail!("sleep_on_no_capacity must be greater than 0");
        }

        if self.sleep_on_paused.is_zero() {
            anyhow::bail!("sleep_on_paused must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            format!("courier-{}", uuid::Uuid::new_v4()),
            "http://localhost:8080".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.worker_id.starts_with("courier-"));
        assert_eq!(config.poll_timeout, PollTimeout::ServerDefault);
        assert_eq!(config.sleep_on_generic_error, Duration::from_millis(200));
        assert_eq!(config.sleep_on_no_capacity, Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("WORKER_ID", "worker-7"),
            ("QUEUE_SERVER_URL", "https://queue.internal"),
            ("QUEUE_AUTH_TOKEN", "abc"),
            ("POLL_TIMEOUT_MS", "750"),
            ("SLEEP_ON_GENERIC_ERROR_MS", "1000"),
            ("WORKER_BATCH_SIZE", "4"),
            ("WORKER_DOMAIN", "blue"),
        ]))
        .unwrap();

        assert_eq!(config.worker_id, "worker-7");
        assert_eq!(config.server_url, "https://queue.internal");
        assert_eq!(config.auth_token.as_deref(), Some("abc"));
        assert_eq!(
            config.poll_timeout,
            PollTimeout::After(Duration::from_millis(750))
        );
        assert_eq!(config.sleep_on_generic_error, Duration::from_secs(1));
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.domain.as_deref(), Some("blue"));
    }

    #[test]
    fn test_config_from_lookup_falls_back_on_garbage() {
        let config = Config::from_lookup(lookup(&[
            ("POLL_TIMEOUT_MS", "-1"),
            ("SLEEP_ON_NO_CAPACITY_MS", "soon"),
            ("WORKER_DOMAIN", "  "),
        ]))
        .unwrap();

        assert_eq!(config.poll_timeout, PollTimeout::ServerDefault);
        assert_eq!(config.sleep_on_no_capacity, DEFAULT_SLEEP_ON_NO_CAPACITY);
        assert!(config.domain.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Empty worker_id should fail
        config.worker_id = String::new();
        assert!(config.validate().is_err());

        config.worker_id = "test".to_string();

        // Invalid URL should fail
        config.server_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.server_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());

        config.sleep_on_paused = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
