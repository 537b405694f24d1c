//! # Task Signatures
//!
//! A [`Signature`] is the self-contained unit of work that travels through the
//! broker: which task to run, its typed arguments, the retry budget, group
//! membership, and the successor signatures to dispatch on success, on error,
//! or when the whole group completes (the chord callback).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::args::TaskArg;

/// One task invocation plus its successors and group membership.
///
/// Identity (`uuid`, `name`) is stable; the retry fields mutate as the
/// signature is rescheduled. A nil `uuid` means "not yet assigned"; the
/// server's publish path fills it in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub args: Vec<TaskArg>,
    /// Remaining retry budget; decremented on each reschedule.
    #[serde(default)]
    pub retry_count: u32,
    /// Current back-off in seconds; advanced by Fibonacci successor on retry.
    #[serde(default)]
    pub retry_timeout: u64,
    /// Earliest execution time; set when the signature is rescheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
    /// When true, this task's results are not appended to successor arguments.
    #[serde(default)]
    pub immutable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_uuid: Option<Uuid>,
    /// Size of the group this signature belongs to; 0 when not a member.
    #[serde(default)]
    pub group_task_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord_callback: Option<Box<Signature>>,
}

impl Signature {
    /// Create a signature for a registered task with a fresh UUID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<TaskArg>) -> Self {
        self.args = args;
        self
    }

    pub fn with_retries(mut self, retry_count: u32, retry_timeout: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_timeout = retry_timeout;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Mark this signature as a member of a group of `group_task_count` tasks.
    pub fn in_group(mut self, group_uuid: Uuid, group_task_count: usize) -> Self {
        self.group_uuid = Some(group_uuid);
        self.group_task_count = group_task_count;
        self
    }

    pub fn on_success(mut self, successor: Signature) -> Self {
        self.on_success.push(successor);
        self
    }

    pub fn on_error(mut self, successor: Signature) -> Self {
        self.on_error.push(successor);
        self
    }

    pub fn with_chord(mut self, callback: Signature) -> Self {
        self.chord_callback = Some(Box::new(callback));
        self
    }

    pub fn is_group_member(&self) -> bool {
        self.group_uuid.is_some()
    }

    /// Whether the signature is eligible for execution now.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.eta {
            Some(eta) => eta <= now,
            None => true,
        }
    }
}
