//! Signal handling for interrupting a run
//!
//! CTRL-C and SIGTERM are turned into a broadcast so the coordinator can stop
//! the worker pool from inside its own `select!` loop.

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Signal handler feeding a shutdown broadcaster
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<()>,
}

impl SignalHandler {
    /// Create a new signal handler with the given shutdown broadcaster
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// Spawn the task that waits for CTRL-C or SIGTERM
    ///
    /// If a handler cannot be installed that signal is never observed; the
    /// other one still is.
    pub fn setup(&self) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                match signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl+C signal received"),
                    Err(e) => {
                        warn!("Failed to install Ctrl+C handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                        info!("SIGTERM signal received");
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {},
                _ = terminate => {},
            }

            info!("Interrupt received, stopping workers");
            let _ = shutdown_tx.send(());
        })
    }
}

/// Create a shutdown signal broadcaster
pub fn create_shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(1)
}
