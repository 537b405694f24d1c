//! # Server
//!
//! Wires the broker, the result backend, and the task registry together, and
//! owns the publish path every signature goes through: user submissions,
//! retry reschedules, successor callbacks, and chord callbacks all funnel
//! into [`Server::send_task`].

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::backends::{BackendError, ResultBackend};
use crate::brokers::{Broker, BrokerError};
use crate::config::Config;
use crate::registry::TaskRegistry;
use crate::tasks::{Signature, TaskHandler};
use crate::worker::Worker;

/// Failure on the publish path. The operation that tried to send fails;
/// already-committed task state is not rolled back.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("failed to record pending state for task {uuid}: {source}")]
    PendingState {
        uuid: Uuid,
        #[source]
        source: BackendError,
    },

    #[error("failed to publish task {uuid}: {source}")]
    Publish {
        uuid: Uuid,
        #[source]
        source: BrokerError,
    },
}

/// The shared heart of a deployment: broker + backend + registry + config.
pub struct Server {
    config: Config,
    broker: Arc<dyn Broker>,
    backend: Arc<dyn ResultBackend>,
    registry: TaskRegistry,
}

impl Server {
    pub fn new(config: Config, broker: Arc<dyn Broker>, backend: Arc<dyn ResultBackend>) -> Self {
        Self {
            config,
            broker,
            backend,
            registry: TaskRegistry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn backend(&self) -> &Arc<dyn ResultBackend> {
        &self.backend
    }

    pub async fn register_task(&self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.registry.register(name, handler).await;
    }

    pub async fn is_task_registered(&self, name: &str) -> bool {
        self.registry.is_registered(name).await
    }

    pub async fn registered_task(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.registry.get(name).await
    }

    /// Publish a signature. Assigns a fresh UUID when the signature carries
    /// none and records PENDING before it reaches the broker. Returns the
    /// signature as published.
    pub async fn send_task(&self, mut signature: Signature) -> Result<Signature, RouterError> {
        if signature.uuid.is_nil() {
            signature.uuid = Uuid::new_v4();
        }

        self.backend
            .set_state_pending(&signature)
            .await
            .map_err(|source| RouterError::PendingState {
                uuid: signature.uuid,
                source,
            })?;

        self.broker
            .publish(&signature)
            .await
            .map_err(|source| RouterError::Publish {
                uuid: signature.uuid,
                source,
            })?;

        debug!(uuid = %signature.uuid, task = %signature.name, "task sent");
        Ok(signature)
    }

    /// Create a worker bound to this server.
    pub fn new_worker(self: &Arc<Self>, consumer_tag: impl Into<String>, concurrency: usize) -> Worker {
        Worker::new(self.clone(), consumer_tag.into(), concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryBackend;
    use crate::brokers::InMemoryBroker;
    use crate::tasks::TaskState;

    fn test_server() -> (Arc<Server>, Arc<InMemoryBroker>, Arc<InMemoryBackend>) {
        let broker = Arc::new(InMemoryBroker::new());
        let backend = Arc::new(InMemoryBackend::new());
        let server = Arc::new(Server::new(
            Config::default(),
            broker.clone(),
            backend.clone(),
        ));
        (server, broker, backend)
    }

    #[tokio::test]
    async fn test_send_task_assigns_uuid_and_records_pending() {
        let (server, broker, backend) = test_server();

        let unassigned = Signature {
            name: "add".to_string(),
            ..Default::default()
        };
        let sent = server.send_task(unassigned).await.unwrap();

        assert!(!sent.uuid.is_nil());
        let record = backend.task_state(sent.uuid).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(broker.queued_len().await, 1);
    }

    #[tokio::test]
    async fn test_send_task_keeps_existing_uuid() {
        let (server, _broker, _backend) = test_server();

        let signature = Signature::new("add");
        let uuid = signature.uuid;
        let sent = server.send_task(signature).await.unwrap();
        assert_eq!(sent.uuid, uuid);
    }
}
