//! Task poller
//!
//! One poll loop runs per registered task type. Each iteration:
//! 1. exits if the engine was cancelled or the type was unregistered
//! 2. sleeps while the type is paused, waking early on resume
//! 3. reserves every free slot, or sleeps when there is none
//! 4. polls for at most that many tasks and spawns one execution per task
//!
//! Reserved slots that the poll did not fill are released right away. A
//! dispatched execution keeps its slot until its result has been reported.

use std::sync::Arc;
use std::time::Duration;

use courier_client::ClientError;
use courier_core::domain::task::Task;
use courier_core::dto::poll::BatchPollRequest;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::registry::TaskTypeConfig;
use super::tracker::Permit;
use super::SchedulerState;

/// Starts the poll loop of `task_type` on the engine's task tracker
pub fn spawn_poll_loop(state: Arc<SchedulerState>, task_type: String) {
    let tasks = state.tasks.clone();
    tasks.spawn(async move {
        PollLoop { state, task_type }.run().await;
    });
}

struct PollLoop {
    state: Arc<SchedulerState>,
    task_type: String,
}

impl PollLoop {
    async fn run(&self) {
        info!(task_type = %self.task_type, "Poll loop started");

        while !self.state.cancellation.is_cancelled() {
            let Some(config) = self.state.registry.snapshot(&self.task_type) else {
                if self.state.registry.retire_loop(&self.task_type) {
                    break;
                }
                continue;
            };

            if self.wait_while_paused().await {
                continue;
            }

            let permits =
                self.state
                    .tracker
                    .try_reserve(&self.state.registry, &self.task_type, usize::MAX);
            if permits.is_empty() {
                debug!(task_type = %self.task_type, "No capacity available");
                self.sleep(self.state.backoff.no_capacity()).await;
                continue;
            }

            let Some(outcome) = self.poll(&config, permits.len()).await else {
                break;
            };

            match outcome {
                Ok(tasks) if tasks.is_empty() => {
                    drop(permits);
                    self.sleep(config.poll_interval).await;
                }
                Ok(tasks) => self.dispatch(&config, tasks, permits),
                Err(e) => {
                    drop(permits);
                    error!(
                        task_type = %self.task_type,
                        domain = ?config.domain,
                        "Error polling for tasks: {:#}",
                        e
                    );
                    self.state
                        .metrics
                        .record_poll_error(&self.task_type, error_kind(&e));
                    self.sleep(self.state.backoff.generic_error()).await;
                }
            }
        }

        info!(task_type = %self.task_type, "Poll loop stopped");
    }

    /// Issues one batch poll for up to `count` tasks
    ///
    /// Returns `None` if the engine was cancelled while waiting.
    async fn poll(&self, config: &TaskTypeConfig, count: usize) -> Option<anyhow::Result<Vec<Task>>> {
        let request = BatchPollRequest {
            task_type: self.task_type.clone(),
            count,
            domain: config.domain.clone(),
            timeout: config
                .poll_timeout
                .unwrap_or_else(|| self.state.registry.default_poll_timeout()),
            worker_id: self.state.worker_id.clone(),
        };

        debug!(
            task_type = %self.task_type,
            batch_size = count,
            domain = ?config.domain,
            "Polling for tasks"
        );

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = self.state.cancellation.cancelled() => return None,
            outcome = self.state.repository.batch_poll(&request) => outcome,
        };
        self.state
            .metrics
            .record_poll(&self.task_type, started.elapsed());

        Some(outcome)
    }

    /// Spawns one execution per task, each owning one permit
    fn dispatch(&self, config: &TaskTypeConfig, tasks: Vec<Task>, mut permits: Vec<Permit>) {
        debug!(
            task_type = %self.task_type,
            "Polled {} task(s)",
            tasks.len()
        );

        for task in tasks {
            let Some(permit) = permits.pop() else {
                warn!(
                    task_type = %self.task_type,
                    task_id = %task.task_id,
                    "Queue returned more tasks than requested, leaving task to lease expiry"
                );
                continue;
            };

            let state = Arc::clone(&self.state);
            let handler = Arc::clone(&config.handler);
            let worker_token = config.cancellation.clone();
            let task_type = self.task_type.clone();

            self.state.tasks.spawn(async move {
                let cancellation = state.cancellation.child_token();
                let execution = state
                    .executor
                    .execute(handler, task, cancellation.clone());
                let result = match worker_token {
                    None => execution.await,
                    Some(worker_token) => {
                        tokio::pin!(execution);
                        tokio::select! {
                            result = &mut execution => result,
                            _ = worker_token.cancelled() => {
                                cancellation.cancel();
                                execution.await
                            }
                        }
                    }
                };

                if let Err(e) = state.reporter.report(&task_type, &result).await {
                    error!(
                        task_type = %task_type,
                        task_id = %result.task_id,
                        workflow_id = %result.workflow_instance_id,
                        "{:#}",
                        e
                    );
                }

                drop(permit);
            });
        }
    }

    /// Sleeps one paused backoff if the type is paused
    ///
    /// A resume or a cancellation ends the sleep early. Returns `false` right
    /// away when the type is not paused.
    async fn wait_while_paused(&self) -> bool {
        let resumed = self.state.registry.resumed();
        tokio::pin!(resumed);
        resumed.as_mut().enable();

        if !self.state.registry.is_paused(&self.task_type) {
            return false;
        }

        debug!(task_type = %self.task_type, "Task type paused");
        self.state.metrics.record_paused(&self.task_type);
        tokio::select! {
            _ = self.state.cancellation.cancelled() => {}
            _ = tokio::time::sleep(self.state.backoff.paused()) => {}
            _ = resumed => {}
        }
        true
    }

    /// Sleeps for `duration` unless the engine is cancelled first
    async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = self.state.cancellation.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

/// Coarse label for a poll failure
fn error_kind(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<ClientError>() {
        Some(e) if e.is_not_found() => "not_found",
        Some(e) if e.is_transient() => "transient",
        Some(e) if e.is_client_error() => "client",
        Some(ClientError::ParseError(_)) => "parse",
        Some(_) => "invalid",
        None => "other",
    }
}
