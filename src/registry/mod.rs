//! # Task Registry
//!
//! Name-to-handler lookup for the tasks this worker knows how to run.
//! Signatures naming unregistered tasks are not an error: other workers in
//! the fleet may carry the registration.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::tasks::TaskHandler;

/// Thread-safe registry of task handlers keyed by task name.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, replacing any previous registration.
    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let name = name.into();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(name.clone(), handler).is_some() {
            warn!(task = %name, "task already registered, replacing");
        } else {
            info!(task = %name, "registered task");
        }
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().await.get(name).cloned()
    }

    pub async fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{task_fn, TaskResult};

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = TaskRegistry::new();
        assert!(!registry.is_registered("add").await);
        assert!(registry.get("add").await.is_none());

        registry
            .register(
                "add",
                Arc::new(task_fn(|a: i64, b: i64| async move {
                    Ok(vec![TaskResult::int(a + b)])
                })),
            )
            .await;

        assert!(registry.is_registered("add").await);
        assert!(registry.get("add").await.is_some());
        assert_eq!(registry.registered_names().await, vec!["add"]);
    }

    #[tokio::test]
    async fn test_replacing_registration() {
        let registry = TaskRegistry::new();
        let ping = || Arc::new(task_fn(|| async { Ok(vec![TaskResult::string("pong")]) }));

        registry.register("ping", ping()).await;
        registry.register("ping", ping()).await;

        assert_eq!(registry.registered_names().await.len(), 1);
    }
}
