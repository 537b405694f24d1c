//! # Per-Message Processor
//!
//! Drives one delivered signature through its lifecycle: record RECEIVED,
//! bind arguments, record STARTED, invoke, then settle into SUCCESS, FAILURE
//! or a rescheduled RETRY. Success and error successors fan out from here;
//! group bookkeeping hands off to the chord coordinator.
//!
//! The broker invokes [`SignatureProcessor::process`] concurrently from up to
//! the configured number of tasks. Each invocation owns its delivered
//! signature and writes only backend rows keyed by that signature's UUID, so
//! no extra locking is needed here.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Worker;
use crate::brokers::SignatureProcessor;
use crate::config::UnknownTaskPolicy;
use crate::error::ProcessError;
use crate::retry;
use crate::tasks::{humanize_results, Signature, TaskArg, TaskResult};

#[async_trait]
impl SignatureProcessor for Worker {
    async fn process(&self, signature: Signature) -> Result<(), ProcessError> {
        self.process_signature(signature).await
    }
}

impl Worker {
    /// Process one delivered signature.
    ///
    /// Returning `Err` signals the broker that the delivery was not handled
    /// and should be redelivered; a task-level failure is a normal terminal
    /// state and returns `Ok`.
    pub async fn process_signature(&self, mut signature: Signature) -> Result<(), ProcessError> {
        let handler = match self.server().registered_task(&signature.name).await {
            Some(handler) => handler,
            None => return self.handle_unknown(signature).await,
        };

        self.server().backend().set_state_received(&signature).await?;
        debug!(uuid = %signature.uuid, task = %signature.name, "task received");

        // A bind failure means the signature is malformed; it goes straight
        // to FAILURE, with no retry regardless of the remaining budget.
        let bound = match handler.bind(&signature.args) {
            Ok(bound) => bound,
            Err(bind_err) => {
                warn!(uuid = %signature.uuid, task = %signature.name, error = %bind_err, "malformed signature");
                return self.task_failed(&signature, &bind_err.to_string()).await;
            }
        };

        self.server().backend().set_state_started(&signature).await?;
        debug!(uuid = %signature.uuid, task = %signature.name, "task started");

        match bound.call().await {
            Ok(results) => self.task_succeeded(&signature, results).await,
            Err(call_err) => {
                if signature.retry_count > 0 {
                    self.task_retry(&mut signature).await
                } else {
                    self.task_failed(&signature, &call_err.to_string()).await
                }
            }
        }
    }

    /// Unknown tasks are not an error: another worker in the fleet may carry
    /// the registration, so the default is to ack without any state write.
    async fn handle_unknown(&self, signature: Signature) -> Result<(), ProcessError> {
        match self.server().config().on_unknown {
            UnknownTaskPolicy::Ack => {
                debug!(uuid = %signature.uuid, task = %signature.name, "task not registered with this worker, dropping");
                Ok(())
            }
            UnknownTaskPolicy::Requeue => {
                debug!(uuid = %signature.uuid, task = %signature.name, "task not registered with this worker, requeueing");
                self.server().send_task(signature).await?;
                Ok(())
            }
        }
    }

    /// Reschedule a failed signature: record RETRY, decrement the budget,
    /// advance the Fibonacci back-off, stamp the ETA and republish.
    async fn task_retry(&self, signature: &mut Signature) -> Result<(), ProcessError> {
        self.server().backend().set_state_retry(signature).await?;

        signature.retry_count -= 1;
        signature.retry_timeout = retry::fibonacci_next(signature.retry_timeout);
        signature.eta = Some(Utc::now() + chrono::Duration::seconds(signature.retry_timeout as i64));

        warn!(
            uuid = %signature.uuid,
            task = %signature.name,
            delay_secs = signature.retry_timeout,
            retries_left = signature.retry_count,
            "task failed, scheduling retry"
        );

        self.server().send_task(signature.clone()).await?;
        Ok(())
    }

    /// Commit SUCCESS, fan out success callbacks, then let the chord
    /// coordinator decide whether this completion finished a group.
    async fn task_succeeded(
        &self,
        signature: &Signature,
        results: Vec<TaskResult>,
    ) -> Result<(), ProcessError> {
        self.server()
            .backend()
            .set_state_success(signature, &results)
            .await?;
        info!(
            uuid = %signature.uuid,
            task = %signature.name,
            results = %humanize_results(&results),
            "task processed"
        );

        for successor in &signature.on_success {
            let mut successor = successor.clone();
            if successor.uuid.is_nil() {
                successor.uuid = Uuid::new_v4();
            }
            if !signature.immutable {
                successor
                    .args
                    .extend(results.iter().cloned().map(TaskArg::from));
            }
            // The parent's terminal state is committed; a dispatch failure
            // must not undo it.
            if let Err(err) = self.server().send_task(successor).await {
                warn!(parent = %signature.uuid, error = %err, "failed to dispatch success callback");
            }
        }

        if signature.is_group_member() {
            self.handle_group_member_success(signature).await?;
        }

        Ok(())
    }

    /// Commit FAILURE and fan out error callbacks, each with the error
    /// message prepended as its first argument.
    async fn task_failed(
        &self,
        signature: &Signature,
        error_message: &str,
    ) -> Result<(), ProcessError> {
        self.server()
            .backend()
            .set_state_failure(signature, error_message)
            .await?;
        error!(
            uuid = %signature.uuid,
            task = %signature.name,
            error = %error_message,
            "task failed"
        );

        for successor in &signature.on_error {
            let mut successor = successor.clone();
            if successor.uuid.is_nil() {
                successor.uuid = Uuid::new_v4();
            }
            let mut args = vec![TaskArg::string(error_message)];
            args.append(&mut successor.args);
            successor.args = args;

            if let Err(err) = self.server().send_task(successor).await {
                warn!(parent = %signature.uuid, error = %err, "failed to dispatch error callback");
            }
        }

        Ok(())
    }
}
