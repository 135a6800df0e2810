//! Instrument source port.
//!
//! Implementation: `tally-monitor` crate (sysinfo).

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::metric::Snapshot;

/// A producer of named metric samples.
///
/// One `collect` call returns everything the source currently observes.
/// Counter entries in the returned snapshot are deltas.
#[async_trait]
pub trait InstrumentSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Take one sample of every metric this source exposes
    async fn collect(&self) -> Result<Snapshot, CoreError>;
}
