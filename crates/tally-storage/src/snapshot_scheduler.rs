//! Snapshot scheduler.
//!
//! Moves the live store's contents to a durable backend: once at startup in
//! the other direction (restore), then every `store_interval`, and a final
//! time while draining on shutdown. With a zero interval there is no ticker;
//! callers report each mutation through [`SnapshotScheduler::notify_write`]
//! and every write is flushed immediately.
//!
//! ```text
//! Stopped → Restoring → Running → Draining → Stopped
//! ```
//!
//! `Restoring` is skipped when restore is disabled. Neither a failed restore
//! nor a failed flush stops the scheduler; both are logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tally_core::error::CoreError;
use tally_core::ports::persistence::PersistenceBackend;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    /// Not started, or fully shut down
    Stopped,
    /// Loading the durable snapshot into the live store
    Restoring,
    /// Flushing on schedule (or on every write)
    Running,
    /// Performing the shutdown flush
    Draining,
}

impl SnapshotState {
    /// Lowercase label for logs and health output
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotState::Stopped => "stopped",
            SnapshotState::Restoring => "restoring",
            SnapshotState::Running => "running",
            SnapshotState::Draining => "draining",
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Flush period; zero selects synchronous mode
    pub store_interval: Duration,
    /// Load the durable snapshot before serving traffic
    pub restore_on_start: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            store_interval: Duration::from_secs(300),
            restore_on_start: true,
        }
    }
}

/// Periodic and shutdown-triggered flusher between two backends
pub struct SnapshotScheduler {
    live: Arc<dyn PersistenceBackend>,
    durable: Arc<dyn PersistenceBackend>,
    config: SnapshotConfig,
    state_tx: watch::Sender<SnapshotState>,
    last_flush: Mutex<Option<DateTime<Utc>>>,
    /// Keeps read-live/write-durable pairs from interleaving
    flush_lock: tokio::sync::Mutex<()>,
}

impl SnapshotScheduler {
    /// Build a stopped scheduler
    pub fn new(
        live: Arc<dyn PersistenceBackend>,
        durable: Arc<dyn PersistenceBackend>,
        config: SnapshotConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SnapshotState::Stopped);
        Self {
            live,
            durable,
            config,
            state_tx,
            last_flush: Mutex::new(None),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Watch the lifecycle state
    pub fn subscribe(&self) -> watch::Receiver<SnapshotState> {
        self.state_tx.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SnapshotState {
        *self.state_tx.borrow()
    }

    /// Time of the last successful flush
    pub fn last_flush(&self) -> Option<DateTime<Utc>> {
        *self.last_flush.lock()
    }

    /// `true` when every write is flushed immediately
    pub fn is_synchronous(&self) -> bool {
        self.config.store_interval.is_zero()
    }

    fn set_state(&self, state: SnapshotState) {
        debug!("snapshot scheduler → {}", state.as_str());
        self.state_tx.send_replace(state);
    }

    /// Restore (if enabled) and enter `Running`.
    ///
    /// Await this before accepting traffic. Returns whether a snapshot was
    /// loaded.
    pub async fn start(&self) -> bool {
        let restored = if self.config.restore_on_start {
            self.set_state(SnapshotState::Restoring);
            match self.restore().await {
                Ok(count) => {
                    info!(
                        "restored {count} metrics from {} backend",
                        self.durable.name()
                    );
                    true
                }
                Err(e) => {
                    warn!("snapshot restore skipped, starting empty: {e}");
                    false
                }
            }
        } else {
            false
        };
        self.set_state(SnapshotState::Running);
        restored
    }

    async fn restore(&self) -> Result<usize, CoreError> {
        let snapshot = self.durable.get_metrics().await?;
        if snapshot.is_empty() {
            return Err(CoreError::CorruptOrEmptySnapshot(format!(
                "{} backend holds no metrics",
                self.durable.name()
            )));
        }
        self.live.restore(&snapshot).await?;
        Ok(snapshot.len())
    }

    /// Copy the live snapshot to the durable backend, replacing its contents.
    pub async fn flush(&self) -> Result<(), CoreError> {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.live.get_metrics().await?;
        self.durable.restore(&snapshot).await?;
        *self.last_flush.lock() = Some(Utc::now());
        debug!(
            "snapshot flushed to {} backend: {} metrics",
            self.durable.name(),
            snapshot.len()
        );
        Ok(())
    }

    /// Report a mutation of the live store. Flushes only in synchronous mode.
    pub async fn notify_write(&self) {
        if !self.is_synchronous() || self.state() != SnapshotState::Running {
            return;
        }
        if let Err(e) = self.flush().await {
            warn!("synchronous snapshot flush failed: {e}");
        }
    }

    /// Tick until shutdown, then drain and close the durable backend.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        if self.state() == SnapshotState::Stopped {
            self.set_state(SnapshotState::Running);
        }

        if self.is_synchronous() {
            info!("snapshot scheduler: synchronous mode");
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        } else {
            let period = self.config.store_interval;
            info!("snapshot scheduler: every {}s", period.as_secs_f64());
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.flush().await {
                            warn!("periodic snapshot flush failed: {e}");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        self.drain().await;
    }

    async fn drain(&self) {
        self.set_state(SnapshotState::Draining);
        match self.flush().await {
            Ok(()) => info!("shutdown snapshot flush done"),
            Err(e) => warn!("shutdown snapshot flush failed: {e}"),
        }
        if let Err(e) = self.durable.shutdown().await {
            warn!("{} backend shutdown failed: {e}", self.durable.name());
        }
        self.set_state(SnapshotState::Stopped);
        info!("snapshot scheduler stopped");
    }
}
