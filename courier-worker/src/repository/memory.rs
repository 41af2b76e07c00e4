//! In-memory tasks repository
//!
//! Stands in for the queue service in tests and local runs. Every delivered
//! result goes through a JSON round trip, the same way it would over HTTP, and
//! every poll is recorded so callers can assert on polling behaviour.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use courier_core::domain::task::Task;
use courier_core::domain::task_result::TaskResult;
use courier_core::dto::poll::{BatchPollRequest, PollTimeout};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::TaskRepository;

/// One recorded batch poll
#[derive(Debug, Clone, PartialEq)]
pub struct PollCall {
    pub task_type: String,
    pub count: usize,
    pub domain: Option<String>,
    pub timeout: PollTimeout,
    pub worker_id: String,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Task>>,
    polls: Vec<PollCall>,
    updates: Vec<TaskResult>,
    update_attempts: Vec<Instant>,
    failing_polls: usize,
    failing_updates: usize,
    unreachable: bool,
}

/// Queue service double backed by in-process queues
#[derive(Default)]
pub struct InMemoryTaskRepository {
    state: Mutex<State>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` under its task type
    pub fn push(&self, task: Task) {
        self.state
            .lock()
            .queues
            .entry(task.task_type.clone())
            .or_default()
            .push_back(task);
    }

    /// Tasks of `task_type` not yet handed out
    pub fn pending(&self, task_type: &str) -> usize {
        self.state.lock().queues.get(task_type).map_or(0, VecDeque::len)
    }

    /// Every poll received so far, in order
    pub fn poll_calls(&self) -> Vec<PollCall> {
        self.state.lock().polls.clone()
    }

    /// Number of polls received for `task_type`
    pub fn poll_count(&self, task_type: &str) -> usize {
        self.state
            .lock()
            .polls
            .iter()
            .filter(|call| call.task_type == task_type)
            .count()
    }

    /// Results accepted so far, as decoded from their JSON form
    pub fn updates(&self) -> Vec<TaskResult> {
        self.state.lock().updates.clone()
    }

    /// Instants of every delivery attempt, successful or not
    pub fn update_attempts(&self) -> Vec<Instant> {
        self.state.lock().update_attempts.clone()
    }

    /// Makes the next `n` polls fail
    pub fn fail_next_polls(&self, n: usize) {
        self.state.lock().failing_polls = n;
    }

    /// Makes the next `n` delivery attempts fail
    pub fn fail_next_updates(&self, n: usize) {
        self.state.lock().failing_updates = n;
    }

    /// Makes every call fail as if the service could not be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Waits until at least `n` results were accepted
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub async fn wait_for_updates(&self, n: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.state.lock().updates.len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn batch_poll(&self, request: &BatchPollRequest) -> Result<Vec<Task>> {
        let mut state = self.state.lock();
        state.polls.push(PollCall {
            task_type: request.task_type.clone(),
            count: request.count,
            domain: request.domain.clone(),
            timeout: request.timeout,
            worker_id: request.worker_id.clone(),
            at: Instant::now(),
        });

        if state.unreachable {
            anyhow::bail!("connection refused");
        }
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            anyhow::bail!("injected poll failure");
        }

        let Some(queue) = state.queues.get_mut(&request.task_type) else {
            return Ok(Vec::new());
        };
        let take = request.count.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    async fn update_task(&self, result: &TaskResult) -> Result<()> {
        let mut state = self.state.lock();
        state.update_attempts.push(Instant::now());

        if state.unreachable {
            anyhow::bail!("connection refused");
        }
        if state.failing_updates > 0 {
            state.failing_updates -= 1;
            anyhow::bail!("injected update failure for task {}", result.task_id);
        }

        let wire = serde_json::to_string(result).context("Failed to encode task result")?;
        let decoded: TaskResult =
            serde_json::from_str(&wire).context("Failed to decode task result")?;
        state.updates.push(decoded);

        Ok(())
    }

    async fn server_version(&self) -> Result<String> {
        if self.state.lock().unreachable {
            anyhow::bail!("connection refused");
        }
        Ok("in-memory".to_string())
    }
}
