//! # Task State Definitions
//!
//! Per-task lifecycle states recorded in the result backend. The monotonic
//! order is PENDING -> RECEIVED -> STARTED -> {SUCCESS, FAILURE}, with a
//! sideways RETRY that re-enters the sequence when the retried signature is
//! delivered again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::args::TaskResult;

/// Lifecycle state of a single task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Published to the broker, not yet delivered
    Pending,
    /// Delivered to a worker
    Received,
    /// The task callable is running
    Started,
    /// Task completed and produced results
    Success,
    /// Task terminated with an error
    Failure,
    /// Task failed but was rescheduled with back-off
    Retry,
}

impl TaskState {
    /// Check if this is a terminal state (no further transitions on this delivery)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Received => write!(f, "received"),
            Self::Started => write!(f, "started"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "received" => Ok(Self::Received),
            "started" => Ok(Self::Started),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "retry" => Ok(Self::Retry),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Backend row for one task UUID.
///
/// On a terminal state exactly one of `results` / `error` is populated:
/// `results` on SUCCESS, `error` on FAILURE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStateRecord {
    pub task_uuid: Uuid,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<TaskResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskStateRecord {
    pub fn new(task_uuid: Uuid, state: TaskState) -> Self {
        Self {
            task_uuid,
            state,
            results: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn success(task_uuid: Uuid, results: Vec<TaskResult>) -> Self {
        Self {
            task_uuid,
            state: TaskState::Success,
            results: Some(results),
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failure(task_uuid: Uuid, error: impl Into<String>) -> Self {
        Self {
            task_uuid,
            state: TaskState::Failure,
            results: None,
            error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Failure.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Received.is_terminal());
        assert!(!TaskState::Started.is_terminal());
        assert!(!TaskState::Retry.is_terminal());
    }

    #[test]
    fn test_string_conversion() {
        assert_eq!(TaskState::Started.to_string(), "started");
        assert_eq!("retry".parse::<TaskState>().unwrap(), TaskState::Retry);
        assert!("bogus".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&TaskState::Received).unwrap();
        assert_eq!(json, "\"received\"");
        let parsed: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskState::Received);
    }

    #[test]
    fn test_terminal_records_carry_one_payload() {
        let uuid = Uuid::new_v4();

        let ok = TaskStateRecord::success(uuid, vec![TaskResult::int(5)]);
        assert!(ok.results.is_some());
        assert!(ok.error.is_none());

        let failed = TaskStateRecord::failure(uuid, "boom");
        assert!(failed.results.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
