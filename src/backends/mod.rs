//! # Result Backends
//!
//! The durable store for task states, results, and group metadata. The worker
//! only talks to the [`ResultBackend`] trait; concrete backends decide where
//! rows live. All state writes are idempotent under broker redelivery, and
//! the chord trigger is a compare-and-set so concurrent group completions on
//! different workers fire the chord callback at most once.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::tasks::{Signature, TaskResult, TaskStateRecord};

pub mod memory;

pub use memory::InMemoryBackend;

/// Backend failure. Aborts local processing of the current delivery; the
/// broker remains responsible for redelivering it.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend {operation} failed: {message}")]
    Storage { operation: String, message: String },

    #[error("group {group_uuid} has no recorded metadata")]
    GroupMetaMissing { group_uuid: Uuid },

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Durable store for per-task state and per-group chord metadata.
///
/// Each `set_state_*` call is a single write keyed by the signature's UUID;
/// writing the same state twice is a no-op, not an error.
#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Record PENDING when a signature enters the publish path.
    async fn set_state_pending(&self, signature: &Signature) -> Result<(), BackendError>;

    /// Record RECEIVED when a delivery reaches a worker.
    async fn set_state_received(&self, signature: &Signature) -> Result<(), BackendError>;

    /// Record STARTED once arguments are bound and the callable is about to run.
    async fn set_state_started(&self, signature: &Signature) -> Result<(), BackendError>;

    /// Record RETRY before the signature is rescheduled with back-off.
    async fn set_state_retry(&self, signature: &Signature) -> Result<(), BackendError>;

    /// Record terminal SUCCESS with the call's results.
    async fn set_state_success(
        &self,
        signature: &Signature,
        results: &[TaskResult],
    ) -> Result<(), BackendError>;

    /// Record terminal FAILURE with the error message.
    async fn set_state_failure(
        &self,
        signature: &Signature,
        error: &str,
    ) -> Result<(), BackendError>;

    /// Fetch the current state row for a task, if any.
    async fn task_state(&self, task_uuid: Uuid) -> Result<Option<TaskStateRecord>, BackendError>;

    /// True iff all `group_task_count` members of the group are in a terminal
    /// state.
    async fn group_completed(
        &self,
        group_uuid: Uuid,
        group_task_count: usize,
    ) -> Result<bool, BackendError>;

    /// Compare-and-set the group's chord-triggered flag. Returns true iff
    /// this caller won the race and should dispatch the chord callback.
    async fn trigger_chord(&self, group_uuid: Uuid) -> Result<bool, BackendError>;

    /// State rows for every group member, ordered by member UUID.
    async fn group_task_states(
        &self,
        group_uuid: Uuid,
        group_task_count: usize,
    ) -> Result<Vec<TaskStateRecord>, BackendError>;

    /// Release group metadata. Only meaningful for backends that report
    /// [`requires_group_meta_purge`](Self::requires_group_meta_purge).
    async fn purge_group_meta(&self, group_uuid: Uuid) -> Result<(), BackendError>;

    /// Whether group metadata is transport-coupled and must be purged once
    /// the group's trigger decision has been made.
    fn requires_group_meta_purge(&self) -> bool {
        false
    }
}
