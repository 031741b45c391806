//! Shutdown and cancellation signal.
//!
//! One [`ShutdownController`] stops the whole node; each role
//! [`TaskGroup`](crate::tasks::TaskGroup) owns another so it can be cancelled
//! on its own. Receivers come from a `tokio::sync::broadcast` channel and
//! are `select!`ed alongside the task's main loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::broadcast;

#[derive(Debug)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// A receiver that fires once on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Later calls are no-ops.
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait for SIGINT, SIGTERM or a programmatic [`shutdown`](Self::shutdown),
    /// whichever comes first, and make sure every subscriber has been told.
    pub async fn wait_for_signal(&self) {
        let mut programmatic = self.subscribe();
        if self.is_shutdown() {
            return;
        }

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = terminate => tracing::info!("received SIGTERM"),
            _ = programmatic.recv() => tracing::debug!("shutdown requested"),
        }
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber_once() {
        let controller = ShutdownController::new();
        let mut first = controller.subscribe();
        let mut second = controller.subscribe();
        controller.shutdown();
        controller.shutdown();
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(first.try_recv().is_err());
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn wait_returns_on_programmatic_shutdown() {
        let controller = std::sync::Arc::new(ShutdownController::new());
        let waiter = {
            let controller = std::sync::Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_for_signal().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_after_shutdown_is_immediate() {
        let controller = ShutdownController::new();
        controller.shutdown();
        tokio::time::timeout(Duration::from_millis(100), controller.wait_for_signal())
            .await
            .unwrap();
    }
}
