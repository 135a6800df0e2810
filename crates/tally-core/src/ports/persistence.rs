//! Persistence backend port.
//!
//! Implementations: `tally-storage` crate (in-memory, JSON file, SQLite).
//!
//! The snapshot scheduler flushes with [`PersistenceBackend::restore`]
//! (replace the durable contents with the live snapshot) and restores on
//! startup from [`PersistenceBackend::get_metrics`].

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::metric::{MetricKind, MetricValue, Snapshot};

/// Durable (or in-memory) home of a metric snapshot
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Backend short name for logs
    fn name(&self) -> &'static str;

    /// Health check
    async fn ping(&self) -> Result<(), CoreError>;

    /// Merge one value (gauge overwrite, counter add)
    async fn put(&self, name: &str, value: MetricValue) -> Result<(), CoreError>;

    /// Read one value, gauge namespace first
    async fn get(&self, name: &str) -> Result<MetricValue, CoreError>;

    /// Read one value from one namespace
    async fn get_typed(&self, kind: MetricKind, name: &str) -> Result<MetricValue, CoreError>;

    /// Merge a whole snapshot atomically where the backend supports it
    async fn put_metrics(&self, snapshot: &Snapshot) -> Result<(), CoreError>;

    /// Read everything stored
    async fn get_metrics(&self) -> Result<Snapshot, CoreError>;

    /// Replace everything stored with `snapshot`
    async fn restore(&self, snapshot: &Snapshot) -> Result<(), CoreError>;

    /// Release resources. Later calls may fail with `BackendUnavailable`.
    async fn shutdown(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
