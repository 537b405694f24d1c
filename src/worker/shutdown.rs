//! # Shutdown Plumbing
//!
//! Interrupts reach the worker as an ordered stream of events on a channel.
//! In production the stream is fed by SIGINT/SIGTERM; tests inject synthetic
//! interrupts through the same channel to drive the lifecycle state machine
//! deterministically.

use tokio::sync::mpsc;
use tracing::warn;

/// Spawn a forwarder turning OS interrupt signals into channel events.
///
/// Each received `()` is one interrupt. The worker treats the first as a
/// graceful shutdown request and any later one as an abort.
pub(crate) fn os_interrupts() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut interrupt = match signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "failed to install SIGINT handler");
                    return;
                }
            };
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                }
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        }

        #[cfg(not(unix))]
        {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    warn!("failed to listen for ctrl-c");
                    return;
                }
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        }
    });

    rx
}
