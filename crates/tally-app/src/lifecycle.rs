//! Shutdown signalling shared by both binaries.
//!
//! One watch channel fans the shutdown flag out to the agent loops or to the
//! collector server and its snapshot flusher.

use std::future::Future;
use std::io;

use tokio::sync::watch;
use tracing::{error, info};

/// Lifecycle manager
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    /// New manager, not shut down
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// Clone a shutdown receiver
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Broadcast shutdown
    pub fn shutdown(&self) {
        info!("broadcasting shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for SIGINT/SIGTERM (Ctrl+C elsewhere), then broadcast shutdown.
    pub async fn wait_for_signal(&self) -> io::Result<()> {
        self.shutdown_on(os_signal()).await
    }

    /// Await `signal`, then broadcast shutdown whatever its outcome.
    ///
    /// A handler that fails to install still shuts the tasks down, so the
    /// collector drains and writes its final snapshot before the error
    /// reaches the caller.
    pub async fn shutdown_on<F>(&self, signal: F) -> io::Result<()>
    where
        F: Future<Output = io::Result<()>>,
    {
        let result = signal.await;
        if let Err(e) = &result {
            error!("signal handler unavailable, shutting down: {e}");
        }
        self.shutdown();
        result
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn os_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let lm = LifecycleManager::new();
        assert!(!*lm.subscribe().borrow());
    }

    #[tokio::test]
    async fn signal_broadcasts_to_subscribers() {
        let lm = LifecycleManager::new();
        let mut rx = lm.subscribe();

        lm.shutdown_on(async { Ok(()) }).await.unwrap();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn failed_handler_install_still_shuts_down() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();

        let err = lm
            .shutdown_on(async {
                Err(io::Error::new(io::ErrorKind::Unsupported, "no signals"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(*rx.borrow());
    }
}
