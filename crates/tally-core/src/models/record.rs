//! Wire-level metric record.
//!
//! JSON shape: `{"id", "type", "value"?, "delta"?, "hash"?}`. Used by the
//! batch endpoint, the single-metric JSON endpoints and the agent transport.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::metric::{finite_gauge, MetricKind, MetricValue};

/// One flattened metric entry of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Metric name
    pub id: String,
    /// Namespace tag
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Counter delta (counters only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Gauge value (gauges only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Hex HMAC-SHA256 over the canonical `id:type:value` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl MetricRecord {
    /// Gauge record without hash
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    /// Counter record without hash
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// Record carrying `value` under its own kind
    pub fn from_value(id: impl Into<String>, value: MetricValue) -> Self {
        match value {
            MetricValue::Gauge(v) => Self::gauge(id, v),
            MetricValue::Counter(d) => Self::counter(id, d),
        }
    }

    /// Typed value of the record.
    ///
    /// A gauge must carry `value` and a counter must carry `delta`.
    pub fn to_value(&self) -> Result<MetricValue, CoreError> {
        match self.kind {
            MetricKind::Gauge => {
                self.value
                    .map(MetricValue::Gauge)
                    .ok_or_else(|| CoreError::Validation {
                        field: "value".to_string(),
                        message: format!("gauge {} has no value", self.id),
                    })
            }
            MetricKind::Counter => {
                self.delta
                    .map(MetricValue::Counter)
                    .ok_or_else(|| CoreError::Validation {
                        field: "delta".to_string(),
                        message: format!("counter {} has no delta", self.id),
                    })
            }
        }
    }

    /// Reject empty ids, missing payloads and non-finite gauges.
    pub fn validate(&self) -> Result<MetricValue, CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "id".to_string(),
                message: "metric id is empty".to_string(),
            });
        }
        let value = self.to_value()?;
        if let MetricValue::Gauge(v) = value {
            finite_gauge(&self.id, v)?;
        }
        Ok(value)
    }
}
