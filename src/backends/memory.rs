//! # In-Memory Result Backend
//!
//! Keeps task state rows and group metadata in process memory behind
//! `tokio::sync::RwLock`. Used by the test suite and the demo binary; the
//! chord CAS semantics match what a durable backend must provide.

use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use async_trait::async_trait;

use super::{BackendError, ResultBackend};
use crate::tasks::{Signature, TaskResult, TaskState, TaskStateRecord};

#[derive(Debug, Default)]
struct GroupEntry {
    chord_triggered: bool,
    /// Member UUIDs observed so far. BTreeSet keeps member-UUID order for
    /// deterministic chord argument gathering.
    members: BTreeSet<Uuid>,
}

/// In-memory state store with CAS chord triggering.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tasks: RwLock<HashMap<Uuid, TaskStateRecord>>,
    groups: RwLock<HashMap<Uuid, GroupEntry>>,
    purge_group_meta: bool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behave like a transport-coupled backend whose group metadata must be
    /// released after the chord trigger decision.
    pub fn with_group_meta_purge() -> Self {
        Self {
            purge_group_meta: true,
            ..Default::default()
        }
    }

    async fn write_state(&self, signature: &Signature, record: TaskStateRecord) {
        if let Some(group_uuid) = signature.group_uuid {
            let mut groups = self.groups.write().await;
            groups
                .entry(group_uuid)
                .or_default()
                .members
                .insert(signature.uuid);
        }
        self.tasks.write().await.insert(signature.uuid, record);
    }
}

#[async_trait]
impl ResultBackend for InMemoryBackend {
    async fn set_state_pending(&self, signature: &Signature) -> Result<(), BackendError> {
        self.write_state(
            signature,
            TaskStateRecord::new(signature.uuid, TaskState::Pending),
        )
        .await;
        Ok(())
    }

    async fn set_state_received(&self, signature: &Signature) -> Result<(), BackendError> {
        self.write_state(
            signature,
            TaskStateRecord::new(signature.uuid, TaskState::Received),
        )
        .await;
        Ok(())
    }

    async fn set_state_started(&self, signature: &Signature) -> Result<(), BackendError> {
        self.write_state(
            signature,
            TaskStateRecord::new(signature.uuid, TaskState::Started),
        )
        .await;
        Ok(())
    }

    async fn set_state_retry(&self, signature: &Signature) -> Result<(), BackendError> {
        self.write_state(
            signature,
            TaskStateRecord::new(signature.uuid, TaskState::Retry),
        )
        .await;
        Ok(())
    }

    async fn set_state_success(
        &self,
        signature: &Signature,
        results: &[TaskResult],
    ) -> Result<(), BackendError> {
        self.write_state(
            signature,
            TaskStateRecord::success(signature.uuid, results.to_vec()),
        )
        .await;
        Ok(())
    }

    async fn set_state_failure(
        &self,
        signature: &Signature,
        error: &str,
    ) -> Result<(), BackendError> {
        self.write_state(signature, TaskStateRecord::failure(signature.uuid, error))
            .await;
        Ok(())
    }

    async fn task_state(&self, task_uuid: Uuid) -> Result<Option<TaskStateRecord>, BackendError> {
        Ok(self.tasks.read().await.get(&task_uuid).cloned())
    }

    async fn group_completed(
        &self,
        group_uuid: Uuid,
        group_task_count: usize,
    ) -> Result<bool, BackendError> {
        let groups = self.groups.read().await;
        let entry = match groups.get(&group_uuid) {
            Some(entry) => entry,
            // No member has written yet, so the group cannot be complete.
            None => return Ok(false),
        };

        let tasks = self.tasks.read().await;
        let terminal = entry
            .members
            .iter()
            .filter(|uuid| {
                tasks
                    .get(uuid)
                    .map(|record| record.state.is_terminal())
                    .unwrap_or(false)
            })
            .count();
        Ok(terminal == group_task_count)
    }

    async fn trigger_chord(&self, group_uuid: Uuid) -> Result<bool, BackendError> {
        let mut groups = self.groups.write().await;
        let entry = groups
            .get_mut(&group_uuid)
            .ok_or(BackendError::GroupMetaMissing { group_uuid })?;
        if entry.chord_triggered {
            return Ok(false);
        }
        entry.chord_triggered = true;
        Ok(true)
    }

    async fn group_task_states(
        &self,
        group_uuid: Uuid,
        group_task_count: usize,
    ) -> Result<Vec<TaskStateRecord>, BackendError> {
        let groups = self.groups.read().await;
        let entry = groups
            .get(&group_uuid)
            .ok_or(BackendError::GroupMetaMissing { group_uuid })?;
        if entry.members.len() != group_task_count {
            return Err(BackendError::storage(
                "group_task_states",
                format!(
                    "group {group_uuid} has {} recorded members, expected {group_task_count}",
                    entry.members.len()
                ),
            ));
        }

        let tasks = self.tasks.read().await;
        entry
            .members
            .iter()
            .map(|uuid| {
                tasks.get(uuid).cloned().ok_or_else(|| {
                    BackendError::storage(
                        "group_task_states",
                        format!("no state row for group member {uuid}"),
                    )
                })
            })
            .collect()
    }

    async fn purge_group_meta(&self, group_uuid: Uuid) -> Result<(), BackendError> {
        self.groups.write().await.remove(&group_uuid);
        Ok(())
    }

    fn requires_group_meta_purge(&self) -> bool {
        self.purge_group_meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskArg;

    fn member(group_uuid: Uuid, count: usize) -> Signature {
        Signature::new("add")
            .with_args(vec![TaskArg::int(1), TaskArg::int(2)])
            .in_group(group_uuid, count)
    }

    #[tokio::test]
    async fn test_state_writes_are_idempotent_upserts() {
        let backend = InMemoryBackend::new();
        let sig = Signature::new("add");

        backend.set_state_received(&sig).await.unwrap();
        backend.set_state_received(&sig).await.unwrap();

        let record = backend.task_state(sig.uuid).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Received);

        backend
            .set_state_success(&sig, &[TaskResult::int(3)])
            .await
            .unwrap();
        let record = backend.task_state(sig.uuid).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Success);
        assert_eq!(record.results, Some(vec![TaskResult::int(3)]));
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn test_group_completed_requires_all_terminal() {
        let backend = InMemoryBackend::new();
        let group_uuid = Uuid::new_v4();
        let a = member(group_uuid, 2);
        let b = member(group_uuid, 2);

        assert!(!backend.group_completed(group_uuid, 2).await.unwrap());

        backend.set_state_success(&a, &[]).await.unwrap();
        assert!(!backend.group_completed(group_uuid, 2).await.unwrap());

        backend.set_state_started(&b).await.unwrap();
        assert!(!backend.group_completed(group_uuid, 2).await.unwrap());

        backend.set_state_failure(&b, "boom").await.unwrap();
        assert!(backend.group_completed(group_uuid, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_chord_fires_once() {
        let backend = InMemoryBackend::new();
        let group_uuid = Uuid::new_v4();
        backend
            .set_state_success(&member(group_uuid, 1), &[])
            .await
            .unwrap();

        assert!(backend.trigger_chord(group_uuid).await.unwrap());
        assert!(!backend.trigger_chord(group_uuid).await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_chord_without_meta_is_an_error() {
        let backend = InMemoryBackend::new();
        let err = backend.trigger_chord(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BackendError::GroupMetaMissing { .. }));
    }

    #[tokio::test]
    async fn test_group_task_states_ordered_by_member_uuid() {
        let backend = InMemoryBackend::new();
        let group_uuid = Uuid::new_v4();
        let members: Vec<Signature> = (0..3).map(|_| member(group_uuid, 3)).collect();

        for (i, sig) in members.iter().enumerate() {
            backend
                .set_state_success(sig, &[TaskResult::int(i as i64)])
                .await
                .unwrap();
        }

        let states = backend.group_task_states(group_uuid, 3).await.unwrap();
        let mut expected: Vec<Uuid> = members.iter().map(|s| s.uuid).collect();
        expected.sort();
        let observed: Vec<Uuid> = states.iter().map(|r| r.task_uuid).collect();
        assert_eq!(observed, expected);
    }

    #[tokio::test]
    async fn test_purge_group_meta() {
        let backend = InMemoryBackend::with_group_meta_purge();
        assert!(backend.requires_group_meta_purge());
        assert!(!InMemoryBackend::new().requires_group_meta_purge());

        let group_uuid = Uuid::new_v4();
        backend
            .set_state_success(&member(group_uuid, 1), &[])
            .await
            .unwrap();

        backend.purge_group_meta(group_uuid).await.unwrap();
        // purge is idempotent
        backend.purge_group_meta(group_uuid).await.unwrap();

        let err = backend.trigger_chord(group_uuid).await.unwrap_err();
        assert!(matches!(err, BackendError::GroupMetaMissing { .. }));
    }
}
