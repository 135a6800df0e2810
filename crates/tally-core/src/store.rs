//! Live in-memory metric store.
//!
//! Two independent namespaces, each behind its own `RwLock`. A batch merge
//! holds the counter lock for the counter half and then the gauge lock for
//! the gauge half. A concurrent reader sees each half either not at all or
//! in full, but can observe a batch applied in one namespace and not yet in
//! the other (see `batch_is_atomic_per_namespace_only`).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::CoreError;
use crate::models::metric::{checked_total, finite_gauge, MetricKind, MetricValue, Snapshot};

/// Concurrent gauge/counter map shared by the collector handlers, the
/// snapshot scheduler and the agent loops.
#[derive(Debug, Default)]
pub struct MetricStore {
    gauges: RwLock<HashMap<String, f64>>,
    counters: RwLock<HashMap<String, i64>>,
}

impl MetricStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one value: gauge overwrite, counter add.
    ///
    /// Rejects non-finite gauges and counter totals that would overflow.
    pub fn put(&self, name: &str, value: MetricValue) -> Result<(), CoreError> {
        match value {
            MetricValue::Gauge(v) => {
                let v = finite_gauge(name, v)?;
                self.gauges.write().insert(name.to_string(), v);
            }
            MetricValue::Counter(d) => {
                let mut counters = self.counters.write();
                let total = checked_total(name, counters.get(name).copied().unwrap_or(0), d)?;
                counters.insert(name.to_string(), total);
            }
        }
        Ok(())
    }

    /// Merge a whole snapshot. Counter entries are treated as deltas.
    ///
    /// Nothing is applied when any entry is rejected.
    pub fn put_batch(&self, batch: &Snapshot) -> Result<(), CoreError> {
        batch.check_finite()?;

        if !batch.counters.is_empty() {
            let mut counters = self.counters.write();
            let mut totals = Vec::with_capacity(batch.counters.len());
            for (name, d) in &batch.counters {
                let total = checked_total(name, counters.get(name).copied().unwrap_or(0), *d)?;
                totals.push((name, total));
            }
            for (name, total) in totals {
                counters.insert(name.clone(), total);
            }
        }
        if !batch.gauges.is_empty() {
            let mut gauges = self.gauges.write();
            for (name, v) in &batch.gauges {
                gauges.insert(name.clone(), *v);
            }
        }
        Ok(())
    }

    /// Look a name up in the gauge namespace first, then in counters.
    pub fn get(&self, name: &str) -> Result<MetricValue, CoreError> {
        if let Some(v) = self.gauges.read().get(name) {
            return Ok(MetricValue::Gauge(*v));
        }
        if let Some(d) = self.counters.read().get(name) {
            return Ok(MetricValue::Counter(*d));
        }
        Err(CoreError::not_found(None, name))
    }

    /// Look a name up in one namespace only.
    pub fn get_typed(&self, kind: MetricKind, name: &str) -> Result<MetricValue, CoreError> {
        let found = match kind {
            MetricKind::Gauge => self.gauges.read().get(name).copied().map(MetricValue::Gauge),
            MetricKind::Counter => self
                .counters
                .read()
                .get(name)
                .copied()
                .map(MetricValue::Counter),
        };
        found.ok_or_else(|| CoreError::not_found(Some(kind), name))
    }

    /// Independent copy of both namespaces.
    pub fn get_all(&self) -> Snapshot {
        let gauges = self
            .gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Snapshot { gauges, counters }
    }

    /// Replace the whole store with a persisted snapshot.
    ///
    /// `None` means there was nothing to restore from; the store is left
    /// untouched in that case.
    pub fn restore(&self, snapshot: Option<&Snapshot>) -> Result<(), CoreError> {
        let snapshot = snapshot.ok_or(CoreError::EmptySnapshot)?;
        *self.gauges.write() = snapshot
            .gauges
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        *self.counters.write() = snapshot
            .counters
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Ok(())
    }

    /// Number of distinct metrics across both namespaces
    pub fn len(&self) -> usize {
        self.gauges.read().len() + self.counters.read().len()
    }

    /// Store holds no metrics
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn gauge_is_last_write_wins() {
        let store = MetricStore::new();
        store.put("Alloc", MetricValue::Gauge(1.0)).unwrap();
        store.put("Alloc", MetricValue::Gauge(2.5)).unwrap();
        assert_eq!(store.get("Alloc").unwrap(), MetricValue::Gauge(2.5));
    }

    #[test]
    fn counter_is_additive() {
        let store = MetricStore::new();
        store.put("PollCount", MetricValue::Counter(3)).unwrap();
        store.put("PollCount", MetricValue::Counter(4)).unwrap();
        assert_eq!(
            store.get_typed(MetricKind::Counter, "PollCount").unwrap(),
            MetricValue::Counter(7)
        );
    }

    #[test]
    fn missing_name_is_not_found() {
        let store = MetricStore::new();
        assert!(matches!(
            store.get("nope"),
            Err(CoreError::NotFound { kind: None, .. })
        ));
        store.put("Alloc", MetricValue::Gauge(1.0)).unwrap();
        assert!(matches!(
            store.get_typed(MetricKind::Counter, "Alloc"),
            Err(CoreError::NotFound {
                kind: Some(MetricKind::Counter),
                ..
            })
        ));
    }

    #[test]
    fn same_name_may_live_in_both_namespaces() {
        // Untyped lookup prefers the gauge.
        let store = MetricStore::new();
        store.put("Dup", MetricValue::Counter(9)).unwrap();
        store.put("Dup", MetricValue::Gauge(0.5)).unwrap();
        assert_eq!(store.get("Dup").unwrap(), MetricValue::Gauge(0.5));
        assert_eq!(
            store.get_typed(MetricKind::Counter, "Dup").unwrap(),
            MetricValue::Counter(9)
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_all_returns_independent_copy() {
        let store = MetricStore::new();
        store.put("Alloc", MetricValue::Gauge(1.0)).unwrap();
        let mut copy = store.get_all();
        copy.gauges.insert("Alloc".to_string(), 99.0);
        assert_eq!(store.get("Alloc").unwrap(), MetricValue::Gauge(1.0));
    }

    #[test]
    fn restore_without_snapshot_fails() {
        let store = MetricStore::new();
        assert!(matches!(store.restore(None), Err(CoreError::EmptySnapshot)));
        assert!(store.is_empty());
    }

    #[test]
    fn restore_replaces_contents() {
        let store = MetricStore::new();
        store.put("PollCount", MetricValue::Counter(1)).unwrap();
        store.put("Stale", MetricValue::Gauge(4.0)).unwrap();
        let snapshot = Snapshot::new()
            .with_gauge("Alloc", 3407240.0)
            .with_counter("PollCount", 5);
        store.restore(Some(&snapshot)).unwrap();
        assert_eq!(store.get("PollCount").unwrap(), MetricValue::Counter(5));
        assert_eq!(store.get("Alloc").unwrap(), MetricValue::Gauge(3407240.0));
        assert!(store.get("Stale").is_err());
        assert_eq!(store.get_all(), snapshot);
    }

    #[test]
    fn concurrent_batches_sum_exactly() {
        let store = Arc::new(MetricStore::new());
        let batch = Snapshot::new()
            .with_counter("PollCount", 1)
            .with_gauge("RandomValue", 0.1);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let batch = batch.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.put_batch(&batch).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get("PollCount").unwrap(), MetricValue::Counter(1600));
    }

    #[test]
    fn counter_overflow_is_rejected() {
        let store = MetricStore::new();
        store.put("C", MetricValue::Counter(i64::MAX)).unwrap();
        let err = store.put("C", MetricValue::Counter(1)).unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "delta"));
        assert_eq!(store.get("C").unwrap(), MetricValue::Counter(i64::MAX));
    }

    #[test]
    fn rejected_batch_applies_nothing() {
        let store = MetricStore::new();
        store.put("C", MetricValue::Counter(i64::MAX)).unwrap();
        let batch = Snapshot::new()
            .with_gauge("Alloc", 1.0)
            .with_counter("A", 5)
            .with_counter("C", 1);
        assert!(store.put_batch(&batch).is_err());
        assert_eq!(store.get_all(), Snapshot::new().with_counter("C", i64::MAX));

        let nan = Snapshot::new()
            .with_gauge("X", f64::NAN)
            .with_counter("A", 1);
        assert!(store.put_batch(&nan).is_err());
        assert!(store.put("X", MetricValue::Gauge(f64::INFINITY)).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn batch_is_atomic_per_namespace_only() {
        // A reader may see the counter half of a batch before its gauge half;
        // only the per-namespace view is all-or-nothing.
        const ROUNDS: i64 = 2000;
        let store = Arc::new(MetricStore::new());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 1..=ROUNDS {
                    let batch = Snapshot::new()
                        .with_gauge("G1", i as f64)
                        .with_gauge("G2", i as f64)
                        .with_counter("C1", 1)
                        .with_counter("C2", 1);
                    store.put_batch(&batch).unwrap();
                }
            })
        };

        let mut last_counter = 0;
        loop {
            let seen = store.get_all();
            match (seen.gauges.get("G1"), seen.gauges.get("G2")) {
                (None, None) => {}
                (Some(a), Some(b)) => assert_eq!(a, b, "gauge half of a batch torn"),
                other => panic!("gauge half of a batch torn: {other:?}"),
            }
            let c1 = seen.counters.get("C1").copied().unwrap_or(0);
            let c2 = seen.counters.get("C2").copied().unwrap_or(0);
            assert_eq!(c1, c2, "counter half of a batch torn");
            assert!(c1 >= last_counter);
            last_counter = c1;
            if writer.is_finished() {
                break;
            }
        }
        writer.join().unwrap();

        let done = store.get_all();
        assert_eq!(done.counters["C1"], ROUNDS);
        assert_eq!(done.gauges["G2"], ROUNDS as f64);
    }
}
