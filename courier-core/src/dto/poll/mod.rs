//! Poll DTOs

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a single poll call may block waiting for work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PollTimeout {
    /// Let the queue service apply its own default
    #[default]
    ServerDefault,
    /// Ask the service to hold the call open at most this long
    After(Duration),
}

impl PollTimeout {
    /// Builds a timeout from milliseconds; negative values select the server default
    pub fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            Self::ServerDefault
        } else {
            Self::After(Duration::from_millis(millis.unsigned_abs()))
        }
    }

    /// Milliseconds to send on the wire, `None` when the server default applies
    pub fn as_millis(self) -> Option<u64> {
        match self {
            Self::ServerDefault => None,
            Self::After(timeout) => Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Request to fetch up to `count` tasks of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPollRequest {
    pub task_type: String,
    pub count: usize,
    pub domain: Option<String>,
    pub timeout: PollTimeout,
    /// Identity of the polling worker
    pub worker_id: String,
}
