//! # Brokers
//!
//! The message transport that delivers task signatures to workers. Delivery
//! is at-least-once: a processing error leaves the message eligible for
//! redelivery, and the worker keeps its state writes idempotent to match.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ProcessError;
use crate::tasks::Signature;

pub mod memory;

pub use memory::InMemoryBroker;

/// Broker failure.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The consumer lost its connection; the worker should reconnect.
    #[error("broker connection lost: {message}")]
    ConnectionLost { message: String },

    /// The consumer ended for a reason reconnecting will not fix.
    #[error("broker consumer terminated: {message}")]
    Terminated { message: String },

    #[error("publish failed: {message}")]
    Publish { message: String },

    #[error("signature serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    pub fn terminated(message: impl Into<String>) -> Self {
        Self::Terminated {
            message: message.into(),
        }
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Whether the worker's consumer loop should reconnect and resume.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }
}

/// Receives one decoded signature per delivered message.
///
/// The broker invokes `process` from up to `concurrency` concurrent tasks.
/// Returning `Err` leaves the message unacknowledged so the broker
/// redelivers it; returning `Ok` acknowledges it.
#[async_trait]
pub trait SignatureProcessor: Send + Sync {
    async fn process(&self, signature: Signature) -> Result<(), ProcessError>;
}

/// Message transport consumed by the worker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Block while delivering signatures to `processor`. Returns `Ok(())`
    /// after a clean [`stop_consuming`](Self::stop_consuming); a retriable
    /// error (see [`BrokerError::should_retry`]) asks the caller to
    /// reconnect and consume again.
    async fn start_consuming(
        &self,
        consumer_tag: &str,
        concurrency: usize,
        processor: Arc<dyn SignatureProcessor>,
    ) -> Result<(), BrokerError>;

    /// Idempotent request to stop delivery. Resolves once currently
    /// dispatched `process` calls have finished and consumption has drained.
    async fn stop_consuming(&self);

    /// Enqueue a signature.
    async fn publish(&self, signature: &Signature) -> Result<(), BrokerError>;
}
