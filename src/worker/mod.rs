//! # Worker Process
//!
//! Top-level lifecycle of a single worker: subscribe to the broker under a
//! stable consumer tag, process deliveries at the configured concurrency,
//! reconnect across retriable consumer errors, and shut down on interrupts.
//!
//! ```text
//!   ┌─→ RUNNING ── stop_consuming ──→ DRAINING ── drained ──→ STOPPED
//!   │     │                               │
//!   │     │ first interrupt               │ second interrupt
//!   │     ▼                               ▼
//!   └── (reconnect on retriable        ABORTED
//!        consumer error)
//! ```
//!
//! The first interrupt asks the broker to stop and waits for in-flight tasks
//! to finish before reporting a graceful quit; a second interrupt reports an
//! abrupt quit immediately, without waiting for the drain.

mod chord;
mod processor;
mod shutdown;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::brokers::SignatureProcessor;
use crate::error::WorkerError;
use crate::server::Server;

/// Outcome channel payload: `Ok(())` for a clean consumer stop, otherwise
/// the terminal [`WorkerError`].
pub type Outcome = Result<(), WorkerError>;

/// A single worker process.
pub struct Worker {
    server: Arc<Server>,
    consumer_tag: String,
    concurrency: usize,
    /// Set once a graceful quit is underway, so the consumer loop's clean
    /// return does not race the graceful sentinel.
    quitting: AtomicBool,
    interrupts: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl Worker {
    pub(crate) fn new(server: Arc<Server>, consumer_tag: String, concurrency: usize) -> Self {
        Self {
            server,
            consumer_tag,
            concurrency,
            quitting: AtomicBool::new(false),
            interrupts: std::sync::Mutex::new(None),
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Replace the OS signal stream with an injected interrupt channel.
    /// Used by tests to drive shutdown deterministically.
    pub fn with_interrupt_source(mut self, interrupts: mpsc::Receiver<()>) -> Self {
        self.interrupts = std::sync::Mutex::new(Some(interrupts));
        self
    }

    /// Start the worker and block until it terminates.
    pub async fn launch(self: &Arc<Self>) -> Outcome {
        let (outcomes, mut terminal) = mpsc::channel(4);
        self.launch_async(outcomes);
        terminal
            .recv()
            .await
            .unwrap_or(Err(WorkerError::QuitAbruptly))
    }

    /// Non-blocking launch: spawns the consumer loop and the signal watcher,
    /// delivering the terminal outcome on `outcomes`.
    pub fn launch_async(self: &Arc<Self>, outcomes: mpsc::Sender<Outcome>) {
        let config = self.server.config();
        info!(
            consumer_tag = %self.consumer_tag,
            concurrency = self.concurrency,
            broker = %config.broker,
            default_queue = %config.default_queue,
            result_backend = %config.result_backend,
            "launching worker"
        );

        // Consumer loop: reconnect across retriable errors, deliver the
        // terminal outcome otherwise.
        let worker = Arc::clone(self);
        let consumer_outcomes = outcomes.clone();
        tokio::spawn(async move {
            let broker = worker.server.broker().clone();
            loop {
                let handler: Arc<dyn SignatureProcessor> = worker.clone();
                match broker
                    .start_consuming(&worker.consumer_tag, worker.concurrency, handler)
                    .await
                {
                    Ok(()) => {
                        // A graceful quit reports through its own sentinel.
                        if !worker.quitting.load(Ordering::SeqCst) {
                            let _ = consumer_outcomes.send(Ok(())).await;
                        }
                        return;
                    }
                    Err(err) if err.should_retry() => {
                        warn!(error = %err, "consumer interrupted, reconnecting");
                    }
                    Err(err) => {
                        let _ = consumer_outcomes
                            .send(Err(WorkerError::Consumer(err)))
                            .await;
                        return;
                    }
                }
            }
        });

        // Signal watcher: graceful on the first interrupt, abrupt on the
        // second.
        let injected = self.interrupts.lock().ok().and_then(|mut slot| slot.take());
        let mut interrupts = injected.unwrap_or_else(shutdown::os_interrupts);
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut signals_received = 0u32;
            while interrupts.recv().await.is_some() {
                signals_received += 1;
                if signals_received == 1 {
                    warn!("interrupt received, waiting for running tasks to finish before shutting down");
                    let worker = worker.clone();
                    let outcomes = outcomes.clone();
                    tokio::spawn(async move {
                        worker.quitting.store(true, Ordering::SeqCst);
                        worker.quit().await;
                        let _ = outcomes.send(Err(WorkerError::QuitGracefully)).await;
                    });
                } else {
                    warn!("second interrupt received, quitting abruptly");
                    let _ = outcomes.send(Err(WorkerError::QuitAbruptly)).await;
                    return;
                }
            }
        });
    }

    /// Stop consuming. Resolves once in-flight deliveries have drained.
    pub async fn quit(&self) {
        info!(consumer_tag = %self.consumer_tag, "stopping consumer");
        self.server.broker().stop_consuming().await;
    }

    pub(crate) fn server(&self) -> &Arc<Server> {
        &self.server
    }
}
