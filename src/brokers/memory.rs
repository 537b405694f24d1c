//! # In-Memory Broker
//!
//! FIFO transport used by the test suite and the demo binary. Honors the
//! signature ETA (not-yet-due messages stay queued), bounds concurrent
//! dispatch with a semaphore, requeues messages whose processing failed, and
//! drains in-flight work before a stop completes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, info, warn};

use super::{Broker, BrokerError, SignatureProcessor};
use crate::tasks::Signature;

const IDLE_TICK: Duration = Duration::from_millis(20);

/// Single-queue in-memory broker with at-least-once redelivery.
pub struct InMemoryBroker {
    queue: Arc<Mutex<VecDeque<Signature>>>,
    delivery: Arc<Notify>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    consuming: AtomicBool,
    idle_notify: Notify,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            delivery: Arc::new(Notify::new()),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            consuming: AtomicBool::new(false),
            idle_notify: Notify::new(),
        }
    }

    /// Number of signatures currently waiting in the queue.
    pub async fn queued_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Remove and return every queued signature, oldest first.
    pub async fn take_queued(&self) -> Vec<Signature> {
        self.queue.lock().await.drain(..).collect()
    }

    async fn pop_due(&self) -> Option<Signature> {
        let mut queue = self.queue.lock().await;
        let now = Utc::now();
        let index = queue.iter().position(|sig| sig.is_due(now))?;
        queue.remove(index)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn start_consuming(
        &self,
        consumer_tag: &str,
        concurrency: usize,
        processor: Arc<dyn SignatureProcessor>,
    ) -> Result<(), BrokerError> {
        if self.consuming.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::terminated(format!(
                "consumer '{consumer_tag}' refused: another consumer is active"
            )));
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let concurrency = concurrency.max(1);
        info!(consumer_tag, concurrency, "in-memory consumer started");
        let semaphore = Arc::new(Semaphore::new(concurrency));

        while !self.stop_requested.load(Ordering::SeqCst) {
            match self.pop_due().await {
                Some(signature) => {
                    let permit = tokio::select! {
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                        _ = self.stop_notify.notified() => {
                            // undelivered, keep it for the next consumer
                            self.queue.lock().await.push_front(signature);
                            break;
                        }
                    };

                    let processor = processor.clone();
                    let queue = self.queue.clone();
                    let delivery = self.delivery.clone();
                    tokio::spawn(async move {
                        if let Err(err) = processor.process(signature.clone()).await {
                            warn!(
                                uuid = %signature.uuid,
                                task = %signature.name,
                                error = %err,
                                "processing failed, requeueing for redelivery"
                            );
                            queue.lock().await.push_back(signature);
                            delivery.notify_one();
                        }
                        drop(permit);
                    });
                }
                None => {
                    // Nothing due right now: wake on publish, stop, or the
                    // next ETA tick.
                    tokio::select! {
                        _ = self.delivery.notified() => {}
                        _ = self.stop_notify.notified() => {}
                        _ = tokio::time::sleep(IDLE_TICK) => {}
                    }
                }
            }
        }

        // Let currently dispatched deliveries finish before reporting the
        // consumer as stopped.
        let _ = semaphore.acquire_many(concurrency as u32).await;

        self.consuming.store(false, Ordering::SeqCst);
        self.idle_notify.notify_waiters();
        info!(consumer_tag, "in-memory consumer stopped");
        Ok(())
    }

    async fn stop_consuming(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        loop {
            if !self.consuming.load(Ordering::SeqCst) {
                return;
            }
            let idle = self.idle_notify.notified();
            if !self.consuming.load(Ordering::SeqCst) {
                return;
            }
            idle.await;
        }
    }

    async fn publish(&self, signature: &Signature) -> Result<(), BrokerError> {
        debug!(uuid = %signature.uuid, task = %signature.name, eta = ?signature.eta, "queueing signature");
        self.queue.lock().await.push_back(signature.clone());
        self.delivery.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendError;
    use crate::error::ProcessError;
    use std::sync::atomic::AtomicU32;

    /// Records processed UUIDs; fails the first `fail_first` deliveries.
    struct RecordingProcessor {
        seen: Mutex<Vec<Signature>>,
        fail_first: u32,
        attempts: AtomicU32,
    }

    impl RecordingProcessor {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_first,
                attempts: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SignatureProcessor for RecordingProcessor {
        async fn process(&self, signature: Signature) -> Result<(), ProcessError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(ProcessError::Backend(BackendError::storage(
                    "set_state_received",
                    "injected failure",
                )));
            }
            self.seen.lock().await.push(signature);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivers_in_publish_order() {
        let broker = Arc::new(InMemoryBroker::new());
        let processor = RecordingProcessor::new(0);

        let a = Signature::new("first");
        let b = Signature::new("second");
        broker.publish(&a).await.unwrap();
        broker.publish(&b).await.unwrap();

        let consumer = broker.clone();
        let handler = processor.clone();
        let consuming =
            tokio::spawn(async move { consumer.start_consuming("test", 1, handler).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        broker.stop_consuming().await;
        consuming.await.unwrap().unwrap();

        let seen = processor.seen.lock().await;
        let names: Vec<&str> = seen.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_eta_delays_delivery() {
        let broker = Arc::new(InMemoryBroker::new());
        let processor = RecordingProcessor::new(0);

        let mut delayed = Signature::new("later");
        delayed.eta = Some(Utc::now() + chrono::Duration::milliseconds(150));
        broker.publish(&delayed).await.unwrap();

        let consumer = broker.clone();
        let handler = processor.clone();
        let consuming =
            tokio::spawn(async move { consumer.start_consuming("test", 1, handler).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(processor.seen.lock().await.is_empty());
        assert_eq!(broker.queued_len().await, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(processor.seen.lock().await.len(), 1);

        broker.stop_consuming().await;
        consuming.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_processing_is_redelivered() {
        let broker = Arc::new(InMemoryBroker::new());
        let processor = RecordingProcessor::new(1);

        broker.publish(&Signature::new("flaky")).await.unwrap();

        let consumer = broker.clone();
        let handler = processor.clone();
        let consuming =
            tokio::spawn(async move { consumer.start_consuming("test", 1, handler).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        broker.stop_consuming().await;
        consuming.await.unwrap().unwrap();

        assert_eq!(processor.seen.lock().await.len(), 1);
        assert!(processor.attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_second_consumer_is_refused() {
        let broker = Arc::new(InMemoryBroker::new());
        let processor = RecordingProcessor::new(0);

        let consumer = broker.clone();
        let handler = processor.clone();
        let consuming =
            tokio::spawn(async move { consumer.start_consuming("one", 1, handler).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = broker
            .start_consuming("two", 1, processor.clone())
            .await
            .unwrap_err();
        assert!(!err.should_retry());

        broker.stop_consuming().await;
        consuming.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_take_queued_preserves_order() {
        let broker = InMemoryBroker::new();
        broker.publish(&Signature::new("a")).await.unwrap();
        broker.publish(&Signature::new("b")).await.unwrap();

        let drained = broker.take_queued().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].name, "a");
        assert_eq!(drained[1].name, "b");
        assert_eq!(broker.queued_len().await, 0);
    }
}
