//! # Configuration
//!
//! Worker settings with environment-variable overrides. Every `TASKWEAVE_*`
//! variable is optional; defaults suit local development against the
//! in-memory providers.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// What to do with a delivery naming a task this worker has not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTaskPolicy {
    /// Acknowledge and drop silently; another worker's subscription may carry
    /// the registration.
    #[default]
    Ack,
    /// Republish once and acknowledge, for single-fleet deployments that
    /// would otherwise black-hole misrouted messages.
    Requeue,
}

impl std::str::FromStr for UnknownTaskPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ack" => Ok(Self::Ack),
            "requeue" => Ok(Self::Requeue),
            _ => Err(format!("Invalid unknown-task policy: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Broker descriptor, for startup logging.
    pub broker: String,
    /// Result backend descriptor, for startup logging.
    pub result_backend: String,
    pub default_queue: String,
    /// Concurrent deliveries per worker.
    pub concurrency: usize,
    pub on_unknown: UnknownTaskPolicy,
    pub custom_settings: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: "memory://".to_string(),
            result_backend: "memory://".to_string(),
            default_queue: "taskweave_tasks".to_string(),
            concurrency: 4,
            on_unknown: UnknownTaskPolicy::Ack,
            custom_settings: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(broker) = std::env::var("TASKWEAVE_BROKER") {
            config.broker = broker;
        }

        if let Ok(backend) = std::env::var("TASKWEAVE_RESULT_BACKEND") {
            config.result_backend = backend;
        }

        if let Ok(queue) = std::env::var("TASKWEAVE_DEFAULT_QUEUE") {
            config.default_queue = queue;
        }

        if let Ok(concurrency) = std::env::var("TASKWEAVE_CONCURRENCY") {
            config.concurrency = concurrency.parse().map_err(|e| ConfigError::Invalid {
                key: "TASKWEAVE_CONCURRENCY",
                reason: format!("{e}"),
            })?;
        }

        if let Ok(policy) = std::env::var("TASKWEAVE_ON_UNKNOWN") {
            config.on_unknown = policy.parse().map_err(|reason| ConfigError::Invalid {
                key: "TASKWEAVE_ON_UNKNOWN",
                reason,
            })?;
        }

        Ok(config)
    }
}
