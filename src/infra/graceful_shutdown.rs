//! Graceful shutdown handling.
//!
//! A single [`ShutdownCoordinator`] owns the shutdown state; every
//! long-lived activity holds a cloned [`ShutdownSignal`] and observes
//! cancellation at its next suspension point. Operations that ignore the
//! signal are bugs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Cancellation token that can be cloned into every pipeline activity.
#[derive(Clone)]
pub struct ShutdownSignal {
    shutdown: Arc<AtomicBool>,
    watch_rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Wait for the shutdown signal. Returns immediately if it already
    /// fired; the watch channel retains the latest value, so a signal
    /// raised between the flag check and the await is not missed.
    pub async fn wait(&self) {
        if self.is_shutdown() {
            return;
        }
        let mut rx = self.watch_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Issues [`ShutdownSignal`]s and initiates shutdown exactly once.
pub struct ShutdownCoordinator {
    shutdown: Arc<AtomicBool>,
    watch_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(false);
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            watch_tx,
        }
    }

    /// Get a shutdown signal that can be cloned.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            shutdown: self.shutdown.clone(),
            watch_rx: self.watch_tx.subscribe(),
        }
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Initiating graceful shutdown");
        let _ = self.watch_tx.send(true);
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Install signal handlers and return a future that completes on SIGINT or
/// SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
