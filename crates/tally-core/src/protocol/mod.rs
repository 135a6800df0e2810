//! Sync protocol between agent and collector.
//!
//! A [`Snapshot`] travels as a flat list of [`MetricRecord`]s. [`SyncCodec`]
//! handles the three steps that are independent of the carrier:
//!
//! - `encode`: flatten a snapshot (gauges by name, then counters by name)
//!   and sign each record when a key is configured
//! - `decode`: validate every record and verify every hash that is present;
//!   one failure rejects the whole batch
//! - `apply`: decode, then merge into the live store in one `put_batch`
//!
//! Delivery is at-least-once at best. Batches carry no sequence number, so
//! replaying a batch adds its counter deltas a second time.

pub mod integrity;

use crate::error::CoreError;
use crate::models::metric::Snapshot;
use crate::models::record::MetricRecord;
use crate::ports::persistence::PersistenceBackend;
use crate::store::MetricStore;

pub use integrity::IntegrityKey;

/// Batch encoder/verifier
#[derive(Debug, Clone, Default)]
pub struct SyncCodec {
    key: Option<IntegrityKey>,
}

impl SyncCodec {
    /// Codec without integrity hashing
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that signs on encode and verifies on decode
    pub fn with_key(key: IntegrityKey) -> Self {
        Self { key: Some(key) }
    }

    /// Codec built from an optional configured secret
    pub fn from_secret(secret: Option<&str>) -> Self {
        Self {
            key: IntegrityKey::from_optional(secret),
        }
    }

    /// Whether records are signed/verified
    pub fn is_signing(&self) -> bool {
        self.key.is_some()
    }

    /// Attach a hash to one outgoing record. No-op without a key.
    pub fn sign(&self, record: &mut MetricRecord) -> Result<(), CoreError> {
        match &self.key {
            Some(key) => key.sign_record(record),
            None => Ok(()),
        }
    }

    /// Flatten a snapshot into batch records.
    pub fn encode(&self, snapshot: &Snapshot) -> Result<Vec<MetricRecord>, CoreError> {
        let mut records = Vec::with_capacity(snapshot.len());
        for (id, v) in &snapshot.gauges {
            records.push(MetricRecord::gauge(id.clone(), *v));
        }
        for (id, d) in &snapshot.counters {
            records.push(MetricRecord::counter(id.clone(), *d));
        }
        if let Some(key) = &self.key {
            for record in &mut records {
                key.sign_record(record)?;
            }
        }
        Ok(records)
    }

    /// Verify and fold records back into a snapshot.
    ///
    /// Records without a hash are accepted even when a key is configured.
    /// Repeated ids fold with the merge rule, so two counter records for the
    /// same name sum.
    pub fn decode(&self, records: &[MetricRecord]) -> Result<Snapshot, CoreError> {
        let mut snapshot = Snapshot::new();
        for record in records {
            let value = record.validate()?;
            if let (Some(key), Some(hash)) = (&self.key, record.hash.as_deref()) {
                if !key.verify(&record.id, value, hash)? {
                    return Err(CoreError::IntegrityMismatch {
                        id: record.id.clone(),
                    });
                }
            }
            snapshot.merge_value(&record.id, value)?;
        }
        Ok(snapshot)
    }

    /// Decode and merge into the live store. Returns the record count.
    ///
    /// The store is untouched unless the whole batch decodes.
    pub fn apply(&self, store: &MetricStore, records: &[MetricRecord]) -> Result<usize, CoreError> {
        let batch = self.decode(records)?;
        store.put_batch(&batch)?;
        Ok(records.len())
    }

    /// Decode and merge straight into a persistence backend.
    pub async fn apply_to_backend(
        &self,
        backend: &dyn PersistenceBackend,
        records: &[MetricRecord],
    ) -> Result<usize, CoreError> {
        let batch = self.decode(records)?;
        backend.put_metrics(&batch).await?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metric::{MetricKind, MetricValue};

    fn sample() -> Snapshot {
        Snapshot::new()
            .with_gauge("Alloc", 1221.23)
            .with_gauge("RandomValue", 0.5)
            .with_counter("PollCount", 3)
    }

    #[test]
    fn encode_orders_gauges_then_counters() {
        let records = SyncCodec::new().encode(&sample()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["Alloc", "RandomValue", "PollCount"]);
        assert!(records.iter().all(|r| r.hash.is_none()));
        assert_eq!(records[2].kind, MetricKind::Counter);
    }

    #[test]
    fn signed_batch_verifies() {
        let codec = SyncCodec::with_key(IntegrityKey::new("k").unwrap());
        let records = codec.encode(&sample()).unwrap();
        assert!(records.iter().all(|r| r.hash.is_some()));
        assert_eq!(codec.decode(&records).unwrap(), sample());
    }

    #[test]
    fn tampered_value_rejects_whole_batch() {
        let codec = SyncCodec::with_key(IntegrityKey::new("k").unwrap());
        let mut records = codec.encode(&sample()).unwrap();
        let alloc = records.iter_mut().find(|r| r.id == "Alloc").unwrap();
        alloc.value = Some(1221.24);

        let store = MetricStore::new();
        store.put("PollCount", MetricValue::Counter(10)).unwrap();
        let err = codec.apply(&store, &records).unwrap_err();

        assert!(matches!(err, CoreError::IntegrityMismatch { ref id } if id == "Alloc"));
        assert_eq!(
            store.get_all(),
            Snapshot::new().with_counter("PollCount", 10)
        );
    }

    #[test]
    fn unhashed_records_pass_keyed_decoder() {
        let codec = SyncCodec::with_key(IntegrityKey::new("k").unwrap());
        let records = vec![MetricRecord::gauge("Alloc", 1.0)];
        assert_eq!(codec.decode(&records).unwrap().gauges["Alloc"], 1.0);
    }

    #[test]
    fn unkeyed_decoder_ignores_hashes() {
        let mut record = MetricRecord::counter("PollCount", 1);
        record.hash = Some("deadbeef".to_string());
        assert!(SyncCodec::new().decode(&[record]).is_ok());
    }

    #[test]
    fn duplicate_counter_ids_sum() {
        let records = vec![
            MetricRecord::counter("PollCount", 2),
            MetricRecord::counter("PollCount", 5),
        ];
        let snapshot = SyncCodec::new().decode(&records).unwrap();
        assert_eq!(snapshot.counters["PollCount"], 7);
    }

    #[test]
    fn replayed_batch_double_counts_counters() {
        let codec = SyncCodec::new();
        let store = MetricStore::new();
        let records = codec.encode(&sample()).unwrap();

        codec.apply(&store, &records).unwrap();
        codec.apply(&store, &records).unwrap();

        assert_eq!(store.get("PollCount").unwrap(), MetricValue::Counter(6));
        assert_eq!(store.get("Alloc").unwrap(), MetricValue::Gauge(1221.23));
    }

    #[test]
    fn invalid_record_leaves_store_unchanged() {
        let store = MetricStore::new();
        let bad = MetricRecord {
            id: "Alloc".to_string(),
            kind: MetricKind::Gauge,
            delta: Some(1),
            value: None,
            hash: None,
        };
        let records = vec![MetricRecord::counter("PollCount", 1), bad];
        assert!(SyncCodec::new().apply(&store, &records).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn sign_single_record() {
        let mut record = MetricRecord::counter("PollCount", 5);
        SyncCodec::new().sign(&mut record).unwrap();
        assert!(record.hash.is_none());

        let codec = SyncCodec::from_secret(Some("secret"));
        codec.sign(&mut record).unwrap();
        assert!(record.hash.is_some());
        assert!(codec.decode(&[record]).is_ok());
    }
}
