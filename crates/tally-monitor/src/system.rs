//! Host-wide resource source.
//!
//! `InstrumentSource` implementation over sysinfo: total/free memory and
//! per-core CPU utilization.

use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::System;
use tally_core::error::CoreError;
use tally_core::models::metric::Snapshot;
use tally_core::ports::monitor::InstrumentSource;
use tracing::debug;

/// sysinfo-backed host source
pub struct SystemSource {
    sys: Mutex<System>,
}

impl SystemSource {
    /// New source with an initial CPU/memory refresh
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        Self {
            sys: Mutex::new(sys),
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstrumentSource for SystemSource {
    fn name(&self) -> &str {
        "system"
    }

    async fn collect(&self) -> Result<Snapshot, CoreError> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| CoreError::Internal(format!("system lock failed: {e}")))?;
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        let mut snapshot = Snapshot::new()
            .with_gauge("TotalMemory", sys.total_memory() as f64)
            .with_gauge("FreeMemory", sys.free_memory() as f64);

        // CPU numbering starts at 1
        for (i, cpu) in sys.cpus().iter().enumerate() {
            snapshot
                .gauges
                .insert(format!("CPUutilization{}", i + 1), f64::from(cpu.cpu_usage()));
        }

        debug!(
            "system sample: {} cores, free {}/{}MB",
            sys.cpus().len(),
            sys.free_memory() / 1_048_576,
            sys.total_memory() / 1_048_576
        );

        Ok(crate::finite_readings(snapshot, self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_reports_memory_and_cores() {
        let source = SystemSource::new();
        let snapshot = source.collect().await.unwrap();

        let total = snapshot.gauges["TotalMemory"];
        let free = snapshot.gauges["FreeMemory"];
        assert!(total > 0.0);
        assert!(free <= total);
        assert!(snapshot.gauges.contains_key("CPUutilization1"));
        assert!(snapshot.gauges.values().all(|v| v.is_finite()));
        assert!(snapshot.counters.is_empty());
    }
}
