//! # tally-web
//!
//! Collector HTTP server.
//! Axum router over one active `PersistenceBackend`.
//!
//! ## Endpoints
//! - `POST /update/{type}/{name}/{value}`, `POST /update/`: single metric
//! - `POST /updates/`: agent batch sync
//! - `GET /value/{type}/{name}`, `POST /value/`: single metric read
//! - `GET /`: HTML listing
//! - `GET /ping`: backend health

pub mod error;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tally_core::ports::compressor::PayloadCodec;
use tally_core::ports::persistence::PersistenceBackend;
use tally_core::protocol::SyncCodec;
use tally_storage::snapshot_scheduler::SnapshotScheduler;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Collector application state
#[derive(Clone)]
pub struct AppState {
    /// Backend every handler reads and writes
    pub backend: Arc<dyn PersistenceBackend>,
    /// Integrity verification/signing
    pub codec: SyncCodec,
    /// Snapshot flusher to notify after writes (file persistence only)
    pub snapshots: Option<Arc<SnapshotScheduler>>,
    /// Opaque codec applied to `/updates/` bodies before parsing
    pub inbound: Option<Arc<dyn PayloadCodec>>,
}

impl AppState {
    /// State over `backend` with no integrity key
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            backend,
            codec: SyncCodec::new(),
            snapshots: None,
            inbound: None,
        }
    }

    /// Set the integrity codec
    pub fn with_codec(mut self, codec: SyncCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Report writes to a snapshot scheduler
    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotScheduler>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Decode `/updates/` bodies with `codec`
    pub fn with_inbound_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.inbound = Some(codec);
        self
    }

    /// Called by handlers after every successful mutation.
    pub(crate) async fn after_write(&self) {
        if let Some(snapshots) = &self.snapshots {
            snapshots.notify_write().await;
        }
    }
}

/// Full collector router with tracing and gzip layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::collector_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(RequestDecompressionLayer::new()),
        )
        .with_state(state)
}

/// Collector server
pub struct CollectorServer {
    state: AppState,
}

impl CollectorServer {
    /// New server over `state`
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Bind `address` (`host:port`).
    pub async fn bind(address: &str) -> Result<TcpListener, std::io::Error> {
        let listener = TcpListener::bind(address).await?;
        info!("collector listening on http://{}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serve on `listener` until `shutdown_rx` flips to `true`.
    ///
    /// In-flight requests complete before this returns.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let app = build_router(self.state);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                loop {
                    if *shutdown_rx.borrow() {
                        info!("collector received shutdown signal");
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;

        info!("collector stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tally_core::models::metric::MetricValue;
    use tally_storage::memory::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn server_stops_on_shutdown_signal() {
        let backend = Arc::new(MemoryBackend::new());
        let listener = CollectorServer::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(CollectorServer::new(AppState::new(backend)).run(listener, rx));
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn after_write_without_scheduler_is_noop() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("PollCount", MetricValue::Counter(1)).await.unwrap();
        AppState::new(backend.clone()).after_write().await;
        assert_eq!(backend.store().len(), 1);
    }
}
