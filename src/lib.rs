//! # taskweave
//!
//! Worker execution core of a distributed task queue: consume task
//! signatures from a broker, drive each invocation through the
//! RECEIVED → STARTED → {SUCCESS, FAILURE, RETRY} lifecycle against a
//! result backend, and orchestrate chains of successors, parallel groups,
//! and chord barriers that fire a callback once a whole group completes.
//!
//! Delivery is at-least-once: the worker keeps state writes idempotent and
//! the chord trigger is a backend compare-and-set, so redelivery and
//! concurrent group completions stay safe.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskweave::backends::InMemoryBackend;
//! use taskweave::brokers::InMemoryBroker;
//! use taskweave::tasks::{task_fn, Signature, TaskArg, TaskResult};
//! use taskweave::{Config, Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Arc::new(Server::new(
//!     Config::default(),
//!     Arc::new(InMemoryBroker::new()),
//!     Arc::new(InMemoryBackend::new()),
//! ));
//!
//! server
//!     .register_task(
//!         "add",
//!         Arc::new(task_fn(|a: i64, b: i64| async move {
//!             Ok(vec![TaskResult::int(a + b)])
//!         })),
//!     )
//!     .await;
//!
//! server
//!     .send_task(Signature::new("add").with_args(vec![TaskArg::int(2), TaskArg::int(3)]))
//!     .await?;
//!
//! let worker = Arc::new(server.new_worker("worker-1", 4));
//! worker.launch().await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod brokers;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod retry;
pub mod server;
pub mod tasks;
pub mod worker;

pub use config::{Config, UnknownTaskPolicy};
pub use error::{ProcessError, WorkerError};
pub use server::{RouterError, Server};
pub use worker::Worker;
