//! # tally-monitor
//!
//! Instrument sources for the agent. Each implements the `InstrumentSource`
//! port over sysinfo.
//!
//! - `process`: this process's memory and CPU, plus `RandomValue`
//! - `system`: host memory and per-core CPU

pub mod process;
pub mod system;

use tally_core::models::metric::Snapshot;
use tracing::debug;

/// Drop readings that are NaN or infinite.
///
/// sysinfo reports NaN CPU usage on some platforms before its first full
/// refresh interval; the store would reject the whole reading.
pub(crate) fn finite_readings(mut snapshot: Snapshot, source: &str) -> Snapshot {
    snapshot.gauges.retain(|name, v| {
        let keep = v.is_finite();
        if !keep {
            debug!("{source}: skipping non-finite {name} = {v}");
        }
        keep
    });
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_readings_are_skipped() {
        let snapshot = Snapshot::new()
            .with_gauge("CPUutilization1", f64::NAN)
            .with_gauge("CPUutilization2", 12.5)
            .with_gauge("Sys", f64::INFINITY);

        let kept = finite_readings(snapshot, "test");

        assert_eq!(kept, Snapshot::new().with_gauge("CPUutilization2", 12.5));
    }
}
