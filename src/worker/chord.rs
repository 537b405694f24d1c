//! # Group / Chord Coordinator
//!
//! Answers two questions after a group member succeeds: is the whole group
//! terminal, and did this worker win the right to fire the chord callback?
//! The backend's compare-and-set on the chord flag is the only guarantee
//! against duplicate dispatch when concurrent completions on different
//! workers observe group completion simultaneously.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Worker;
use crate::error::ProcessError;
use crate::tasks::{Signature, TaskArg};

impl Worker {
    /// Called once this worker has committed SUCCESS for a group member.
    pub(crate) async fn handle_group_member_success(
        &self,
        signature: &Signature,
    ) -> Result<(), ProcessError> {
        let group_uuid = match signature.group_uuid {
            Some(group_uuid) => group_uuid,
            None => return Ok(()),
        };

        let backend = self.server().backend();
        let completed = backend
            .group_completed(group_uuid, signature.group_task_count)
            .await?;
        if !completed {
            return Ok(());
        }
        debug!(group_uuid = %group_uuid, "group completed");

        let outcome = self.fire_chord(signature, group_uuid).await;

        // Transport-coupled backends hold group meta in broker resources;
        // release it once the trigger decision is made, whatever it was.
        if backend.requires_group_meta_purge() {
            if let Err(err) = backend.purge_group_meta(group_uuid).await {
                warn!(group_uuid = %group_uuid, error = %err, "failed to purge group meta");
            }
        }

        outcome
    }

    async fn fire_chord(
        &self,
        signature: &Signature,
        group_uuid: Uuid,
    ) -> Result<(), ProcessError> {
        let callback = match &signature.chord_callback {
            Some(callback) => callback.as_ref(),
            None => return Ok(()),
        };

        let backend = self.server().backend();
        if !backend.trigger_chord(group_uuid).await? {
            debug!(group_uuid = %group_uuid, "chord already triggered elsewhere");
            return Ok(());
        }

        // The CAS is already won; losing the member states here must surface
        // so the broker redelivers and the chord path is retried.
        let task_states = backend
            .group_task_states(group_uuid, signature.group_task_count)
            .await?;

        let mut callback = callback.clone();
        if callback.uuid.is_nil() {
            callback.uuid = Uuid::new_v4();
        }

        for state in &task_states {
            if !state.state.is_success() {
                debug!(
                    group_uuid = %group_uuid,
                    member = %state.task_uuid,
                    "group member did not succeed, chord callback not fired"
                );
                return Ok(());
            }
            if !callback.immutable {
                if let Some(results) = &state.results {
                    callback
                        .args
                        .extend(results.iter().cloned().map(TaskArg::from));
                }
            }
        }

        info!(group_uuid = %group_uuid, callback = %callback.name, "firing chord callback");
        self.server().send_task(callback).await?;
        Ok(())
    }
}
