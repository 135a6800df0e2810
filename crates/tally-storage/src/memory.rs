//! In-memory backend over the live `MetricStore`.

use std::sync::Arc;

use async_trait::async_trait;
use tally_core::error::CoreError;
use tally_core::models::metric::{MetricKind, MetricValue, Snapshot};
use tally_core::ports::persistence::PersistenceBackend;
use tally_core::store::MetricStore;

/// Backend whose contents are the live store itself
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<MetricStore>,
}

impl MemoryBackend {
    /// Fresh empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing store
    pub fn with_store(store: Arc<MetricStore>) -> Self {
        Self { store }
    }

    /// The wrapped store
    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn put(&self, name: &str, value: MetricValue) -> Result<(), CoreError> {
        self.store.put(name, value)
    }

    async fn get(&self, name: &str) -> Result<MetricValue, CoreError> {
        self.store.get(name)
    }

    async fn get_typed(&self, kind: MetricKind, name: &str) -> Result<MetricValue, CoreError> {
        self.store.get_typed(kind, name)
    }

    async fn put_metrics(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        self.store.put_batch(snapshot)
    }

    async fn get_metrics(&self) -> Result<Snapshot, CoreError> {
        Ok(self.store.get_all())
    }

    async fn restore(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        self.store.restore(Some(snapshot))
    }
}
