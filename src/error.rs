//! # Error Types
//!
//! Two aggregates sit above the per-module errors: [`ProcessError`] is what
//! one delivery can fail with (and causes broker redelivery), and
//! [`WorkerError`] is the terminal outcome of a worker launch. A task
//! FAILURE is a normal terminal state, never a process-level error.

use thiserror::Error;

use crate::backends::BackendError;
use crate::brokers::BrokerError;
use crate::server::RouterError;

/// Failure while processing one delivered signature. Surfacing this to the
/// broker leaves the message unacknowledged for redelivery.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("backend state write failed: {0}")]
    Backend(#[from] BackendError),

    #[error("signature dispatch failed: {0}")]
    Router(#[from] RouterError),
}

/// Terminal outcome of [`Worker::launch`](crate::worker::Worker::launch).
#[derive(Error, Debug)]
pub enum WorkerError {
    /// First interrupt: consumption was stopped and drained.
    #[error("worker quit gracefully")]
    QuitGracefully,

    /// Second interrupt: the worker stopped without waiting for drain.
    #[error("worker quit abruptly")]
    QuitAbruptly,

    /// The broker consumer failed in a way reconnecting will not fix.
    #[error("broker consumer failed: {0}")]
    Consumer(#[from] BrokerError),
}
