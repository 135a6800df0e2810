//! Collector wiring.
//!
//! Chooses the active backend from `CollectorConfig`:
//! - `database_dsn` set: SQLite serves every request, no snapshot scheduler
//! - otherwise: the in-memory store serves requests, and with a
//!   `file_storage_path` a snapshot scheduler restores it at startup and
//!   flushes it to the file

use std::sync::Arc;

use anyhow::{Context, Result};
use tally_core::config::CollectorConfig;
use tally_core::ports::persistence::PersistenceBackend;
use tally_core::protocol::SyncCodec;
use tally_core::store::MetricStore;
use tally_storage::file::FileBackend;
use tally_storage::memory::MemoryBackend;
use tally_storage::snapshot_scheduler::{SnapshotConfig, SnapshotScheduler};
use tally_storage::sqlite::SqliteBackend;
use tally_web::{AppState, CollectorServer};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Wired collector, restored and ready to serve
pub struct Collector {
    state: AppState,
    snapshots: Option<Arc<SnapshotScheduler>>,
}

impl Collector {
    /// Open the configured backend and run restore-on-start.
    ///
    /// Backend errors here are fatal to the process.
    pub async fn from_config(config: &CollectorConfig) -> Result<Self> {
        let codec = SyncCodec::from_secret(config.key.as_deref());

        if let Some(dsn) = &config.database_dsn {
            let backend = SqliteBackend::open_dsn(dsn)
                .with_context(|| format!("failed to open database {dsn}"))?;
            backend
                .ping()
                .await
                .context("database did not answer ping")?;
            if config.file_storage_path.is_some() {
                info!("database configured; snapshot file is not used");
            }
            let state = AppState::new(Arc::new(backend)).with_codec(codec);
            return Ok(Self {
                state,
                snapshots: None,
            });
        }

        let store = Arc::new(MetricStore::new());
        let live: Arc<dyn PersistenceBackend> = Arc::new(MemoryBackend::with_store(store));
        let mut state = AppState::new(Arc::clone(&live)).with_codec(codec);

        let snapshots = match &config.file_storage_path {
            Some(path) => {
                let durable = FileBackend::open(path, config.remove_broken)
                    .with_context(|| format!("failed to open snapshot file {}", path.display()))?;
                let scheduler = Arc::new(SnapshotScheduler::new(
                    live,
                    Arc::new(durable),
                    SnapshotConfig {
                        store_interval: config.store_interval(),
                        restore_on_start: config.restore,
                    },
                ));
                scheduler.start().await;
                state = state.with_snapshots(Arc::clone(&scheduler));
                Some(scheduler)
            }
            None => {
                info!("no snapshot file configured; metrics live in memory only");
                None
            }
        };

        Ok(Self { state, snapshots })
    }

    /// Shared request state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until shutdown.
    ///
    /// The final snapshot flush runs after the server has drained its
    /// in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let (flush_tx, flush_rx) = watch::channel(false);
        let snapshot_task = self.snapshots.clone().map(|scheduler| {
            tokio::spawn(async move {
                scheduler.run(flush_rx).await;
            })
        });

        let backend = Arc::clone(&self.state.backend);
        let served = CollectorServer::new(self.state)
            .run(listener, shutdown_rx)
            .await;

        let _ = flush_tx.send(true);
        if let Some(task) = snapshot_task {
            if let Err(e) = task.await {
                warn!("snapshot task ended abnormally: {e}");
            }
        } else if let Err(e) = backend.shutdown().await {
            warn!("{} backend shutdown failed: {e}", backend.name());
        }

        served.context("collector server failed")
    }
}
