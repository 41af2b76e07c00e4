//! Result reporter
//!
//! Delivers task results to the queue service. A failed delivery is retried a
//! fixed number of times with a linear backoff: the k-th retry waits `k`
//! steps. When every attempt fails the last error is returned to the caller
//! and the result is dropped; the queue re-offers the task once its lease
//! expires.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use courier_core::domain::task_result::TaskResult;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::WorkerMetrics;
use crate::repository::TaskRepository;

/// Retries after the first delivery attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff unit; retry `k` waits `k` units
pub const DEFAULT_RETRY_STEP: Duration = Duration::from_secs(10);

/// Retry schedule for result delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub step: Duration,
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            step: DEFAULT_RETRY_STEP,
        }
    }
}

/// Service trait for delivering task results
#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Delivers `result` to the queue service
    ///
    /// # Arguments
    /// * `task_type` - Task type the result belongs to, for metrics
    /// * `result` - The result to deliver; retries send the identical value
    ///
    /// # Returns
    /// An error naming the task once every attempt has failed
    async fn report(&self, task_type: &str, result: &TaskResult) -> Result<()>;
}

/// Reporter that retries through a [`TaskRepository`]
pub struct RetryingReporter {
    repository: Arc<dyn TaskRepository>,
    policy: RetryPolicy,
    metrics: WorkerMetrics,
}

impl RetryingReporter {
    pub fn new(repository: Arc<dyn TaskRepository>, metrics: WorkerMetrics) -> Self {
        Self {
            repository,
            policy: RetryPolicy::default(),
            metrics,
        }
    }
}

#[async_trait]
impl ResultReporter for RetryingReporter {
    async fn report(&self, task_type: &str, result: &TaskResult) -> Result<()> {
        let attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay(attempt)).await;
            }

            let started = Instant::now();
            let outcome = self.repository.update_task(result).await;
            self.metrics
                .record_update(task_type, started.elapsed(), outcome.is_err());

            match outcome {
                Ok(()) => {
                    debug!(
                        task_type = %task_type,
                        task_id = %result.task_id,
                        status = ?result.status,
                        "Task result delivered"
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        task_type = %task_type,
                        task_id = %result.task_id,
                        "Failed to deliver result (attempt {}/{}), retrying in {:?}: {:#}",
                        attempt,
                        attempts,
                        self.policy.delay(attempt),
                        e
                    );
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to deliver result of task {} after {} attempts",
                            result.task_id, attempts
                        )
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryTaskRepository;
    use courier_core::domain::task::Task;
    use serde_json::Map;

    fn result() -> TaskResult {
        let task = Task::new("echo", "t-1", "wf-1", Map::new());
        TaskResult::completed(&task, Map::new())
    }

    fn reporter() -> (RetryingReporter, Arc<InMemoryTaskRepository>, WorkerMetrics) {
        let repo = Arc::new(InMemoryTaskRepository::new());
        let metrics = WorkerMetrics::new().unwrap();
        let reporter = RetryingReporter::new(repo.clone(), metrics.clone());
        (reporter, repo, metrics)
    }

    fn gaps(attempts: &[Instant]) -> Vec<Duration> {
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(50),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_linear_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(10));
        assert_eq!(policy.delay(2), Duration::from_secs(20));
        assert_eq!(policy.delay(3), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds() {
        let (reporter, repo, metrics) = reporter();

        reporter.report("echo", &result()).await.unwrap();

        assert_eq!(repo.update_attempts().len(), 1);
        assert_eq!(repo.updates(), vec![result()]);
        assert_eq!(metrics.update_error_count("echo"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff_then_succeeds() {
        let (reporter, repo, metrics) = reporter();
        repo.fail_next_updates(3);

        reporter.report("echo", &result()).await.unwrap();

        let gaps = gaps(&repo.update_attempts());
        assert_eq!(gaps.len(), 3);
        assert_close(gaps[0], Duration::from_secs(10));
        assert_close(gaps[1], Duration::from_secs(20));
        assert_close(gaps[2], Duration::from_secs(30));
        assert_eq!(repo.updates().len(), 1);
        assert_eq!(metrics.update_error_count("echo"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_one_error() {
        let (reporter, repo, metrics) = reporter();
        repo.fail_next_updates(10);

        let err = reporter.report("echo", &result()).await.unwrap_err();

        assert_eq!(repo.update_attempts().len(), 4);
        assert!(repo.updates().is_empty());
        assert_eq!(metrics.update_error_count("echo"), 4);

        let message = format!("{:#}", err);
        assert!(message.contains("task t-1 after 4 attempts"));
        assert!(message.contains("injected update failure"));
    }
}
