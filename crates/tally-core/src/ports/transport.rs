//! Agent → collector transport port.
//!
//! Implementation: `tally-network` crate (reqwest).

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::record::MetricRecord;

/// Delivers one encoded batch to the collector
#[async_trait]
pub trait MetricsTransport: Send + Sync {
    /// Send the batch once. No retry; the caller drops the batch on error.
    async fn send_batch(&self, records: &[MetricRecord]) -> Result<(), CoreError>;
}
