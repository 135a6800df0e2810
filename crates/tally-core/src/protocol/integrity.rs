//! Keyed integrity hash for batch records.
//!
//! HMAC-SHA256 over the canonical form `"{id}:gauge:{value}"` or
//! `"{id}:counter:{delta}"`, rendered as lowercase hex. Gauge values are
//! formatted with six decimals so both ends hash the same text for the same
//! `f64`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CoreError;
use crate::models::metric::MetricValue;
use crate::models::record::MetricRecord;

type HmacSha256 = Hmac<Sha256>;

/// Shared secret used by agent and collector
#[derive(Clone)]
pub struct IntegrityKey {
    secret: Vec<u8>,
}

impl std::fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityKey").finish_non_exhaustive()
    }
}

impl IntegrityKey {
    /// Build a key from a non-empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CoreError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CoreError::Config("integrity key must not be empty".to_string()));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// `None` for an absent or blank secret
    pub fn from_optional(secret: Option<&str>) -> Option<Self> {
        secret
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| Self::new(s).ok())
    }

    fn mac(&self) -> Result<HmacSha256, CoreError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CoreError::Internal(format!("HMAC key rejected: {e}")))
    }

    /// Hex digest of one metric
    pub fn sign(&self, id: &str, value: MetricValue) -> Result<String, CoreError> {
        let mut mac = self.mac()?;
        mac.update(canonical(id, value).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a hex digest against one metric.
    pub fn verify(&self, id: &str, value: MetricValue, hash: &str) -> Result<bool, CoreError> {
        let Ok(expected) = hex::decode(hash.trim()) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(canonical(id, value).as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }

    /// Attach a hash to `record` in place.
    pub fn sign_record(&self, record: &mut MetricRecord) -> Result<(), CoreError> {
        let value = record.to_value()?;
        record.hash = Some(self.sign(&record.id, value)?);
        Ok(())
    }
}

fn canonical(id: &str, value: MetricValue) -> String {
    match value {
        MetricValue::Gauge(v) => format!("{id}:gauge:{v:.6}"),
        MetricValue::Counter(d) => format!("{id}:counter:{d}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_digest() {
        let key = IntegrityKey::new("secret").unwrap();
        let a = key.sign("Alloc", MetricValue::Gauge(1221.23)).unwrap();
        let b = key.sign("Alloc", MetricValue::Gauge(1221.23)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn digest_depends_on_value_kind_and_key() {
        let key = IntegrityKey::new("secret").unwrap();
        let gauge = key.sign("X", MetricValue::Gauge(1.0)).unwrap();
        let counter = key.sign("X", MetricValue::Counter(1)).unwrap();
        assert_ne!(gauge, counter);

        let other = IntegrityKey::new("other").unwrap();
        assert_ne!(gauge, other.sign("X", MetricValue::Gauge(1.0)).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_value_and_bad_hex() {
        let key = IntegrityKey::new("secret").unwrap();
        let hash = key.sign("Alloc", MetricValue::Gauge(1221.23)).unwrap();
        assert!(key.verify("Alloc", MetricValue::Gauge(1221.23), &hash).unwrap());
        assert!(!key.verify("Alloc", MetricValue::Gauge(1221.24), &hash).unwrap());
        assert!(!key.verify("Alloc", MetricValue::Gauge(1221.23), "zz").unwrap());
    }

    #[test]
    fn blank_secret_means_no_key() {
        assert!(IntegrityKey::from_optional(None).is_none());
        assert!(IntegrityKey::from_optional(Some("  ")).is_none());
        assert!(IntegrityKey::new("").is_err());
    }
}
