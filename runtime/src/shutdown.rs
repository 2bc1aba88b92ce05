//! Graceful shutdown coordination.
//!
//! Every service wires the same sequence: wait for SIGINT/SIGTERM, stop
//! accepting HTTP traffic, broadcast the shutdown signal to consumer
//! workers, drain in-flight handlers with a bounded wait, then close the
//! broker and database clients.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wait for SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when
/// the runtime is misconfigured.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down gracefully"),
        () = terminate => info!("received SIGTERM, shutting down gracefully"),
    }
}

/// Broadcast-based shutdown coordinator.
///
/// Workers subscribe before they start; [`ShutdownCoordinator::drain`]
/// signals them and waits out the drain timeout for in-flight handlers to
/// finish.
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator with the given drain timeout (platform
    /// default 10s).
    #[must_use]
    pub fn new(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            drain_timeout,
        }
    }

    /// Subscribe a worker to the shutdown signal.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown without waiting. Mostly useful in tests; services
    /// call [`Self::drain`].
    pub fn signal(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("no active shutdown subscribers");
        }
    }

    /// Signal shutdown and wait for worker tasks to finish, bounded by
    /// the drain timeout.
    pub async fn drain(&self, workers: Vec<JoinHandle<()>>) {
        info!(
            workers = workers.len(),
            timeout_ms = self.drain_timeout.as_millis(),
            "draining in-flight work"
        );
        self.signal();

        let joined = async {
            for worker in workers {
                if let Err(e) = worker.await {
                    warn!(error = %e, "worker task ended abnormally");
                }
            }
        };

        if tokio::time::timeout(self.drain_timeout, joined).await.is_err() {
            warn!(
                timeout_ms = self.drain_timeout.as_millis(),
                "drain timeout elapsed, abandoning remaining workers"
            );
        } else {
            info!("all workers drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_waits_for_workers() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let mut rx = coordinator.subscribe();

        let worker = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        coordinator.drain(vec![worker]).await;
    }

    #[tokio::test]
    async fn drain_gives_up_after_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(20));

        let worker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        // Returns despite the stuck worker.
        coordinator.drain(vec![worker]).await;
    }

    #[tokio::test]
    async fn subscribers_receive_the_signal() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        let mut rx = coordinator.subscribe();
        coordinator.signal();
        assert!(rx.recv().await.is_ok());
    }
}
