//! Own-process runtime source.
//!
//! `InstrumentSource` implementation reporting this process's memory and
//! CPU, plus a `RandomValue` gauge so every report carries a changing value.

use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tally_core::error::CoreError;
use tally_core::models::metric::Snapshot;
use tally_core::ports::monitor::InstrumentSource;
use tracing::debug;

/// Process runtime source
pub struct RuntimeSource {
    sys: Mutex<System>,
    pid: Pid,
}

impl RuntimeSource {
    /// Source for the current process
    pub fn new() -> Result<Self, CoreError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| CoreError::Internal(format!("current pid unavailable: {e}")))?;
        Ok(Self::for_pid(pid))
    }

    /// Source for an arbitrary process
    pub fn for_pid(pid: Pid) -> Self {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Self {
            sys: Mutex::new(sys),
            pid,
        }
    }
}

#[async_trait]
impl InstrumentSource for RuntimeSource {
    fn name(&self) -> &str {
        "runtime"
    }

    async fn collect(&self) -> Result<Snapshot, CoreError> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| CoreError::Internal(format!("system lock failed: {e}")))?;
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let process = sys
            .process(self.pid)
            .ok_or_else(|| CoreError::Internal(format!("process {} not found", self.pid)))?;

        let snapshot = Snapshot::new()
            .with_gauge("Alloc", process.memory() as f64)
            .with_gauge("Sys", process.virtual_memory() as f64)
            .with_gauge("CPUutilization", f64::from(process.cpu_usage()))
            .with_gauge("RandomValue", rand::random::<f64>());

        debug!(
            "runtime sample: rss {}KB, cpu {:.1}%",
            process.memory() / 1024,
            process.cpu_usage()
        );

        Ok(crate::finite_readings(snapshot, self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_reports_own_process() {
        let source = RuntimeSource::new().unwrap();
        let snapshot = source.collect().await.unwrap();

        assert!(snapshot.gauges["Alloc"] > 0.0);
        for name in ["Sys", "CPUutilization", "RandomValue"] {
            assert!(snapshot.gauges.contains_key(name), "missing {name}");
        }
        let random = snapshot.gauges["RandomValue"];
        assert!((0.0..1.0).contains(&random));
    }

    #[tokio::test]
    async fn vanished_process_is_an_error() {
        let source = RuntimeSource::for_pid(Pid::from_u32(u32::MAX - 1));
        assert!(source.collect().await.is_err());
    }
}
