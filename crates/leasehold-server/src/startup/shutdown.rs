//! Graceful shutdown handling

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use leasehold_core::CancelSignal;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Process-wide shutdown notification
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn shutdown(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is triggered. Returns at once if it already was.
    pub async fn wait(&self) {
        let mut receiver = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = receiver.recv().await;
    }

    /// A `CancelSignal` that fires when this shutdown is triggered, for
    /// background tasks that stop on cancellation
    pub fn cancel_signal(&self) -> CancelSignal {
        let cancel = CancelSignal::new();
        let shutdown = self.clone();
        let forward = cancel.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            forward.cancel();
        });
        cancel
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger the returned signal on Ctrl+C or SIGTERM
pub fn wait_for_shutdown_signal() -> ShutdownSignal {
    let shutdown = ShutdownSignal::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        shutdown_clone.shutdown();
    });

    shutdown
}
