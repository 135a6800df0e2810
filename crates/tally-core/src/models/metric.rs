//! Metric value model.
//!
//! `MetricKind` is the namespace tag, `MetricValue` the tagged value, and
//! `Snapshot` the `{gauges, counters}` container used as store copy, wire
//! payload source and on-disk format.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Metric namespace tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time sample, last write wins
    Gauge,
    /// Accumulated total, merges are additive
    Counter,
}

impl MetricKind {
    /// Wire/path representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(CoreError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Tagged metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Latest observed sample
    Gauge(f64),
    /// Delta (on write) or running total (on read)
    Counter(i64),
}

impl MetricValue {
    /// Namespace of this value
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse the textual value of the legacy `/update/{type}/{name}/{value}`
    /// path form.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, CoreError> {
        match kind {
            MetricKind::Gauge => {
                let v = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| CoreError::Validation {
                        field: "value".to_string(),
                        message: format!("invalid gauge value {raw:?}: {e}"),
                    })?;
                Ok(MetricValue::Gauge(finite_gauge(raw, v)?))
            }
            MetricKind::Counter => raw
                .trim()
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|e| CoreError::Validation {
                    field: "delta".to_string(),
                    message: format!("invalid counter delta {raw:?}: {e}"),
                }),
        }
    }
}

/// Reject NaN and infinities; JSON has no representation for them.
pub fn finite_gauge(name: &str, v: f64) -> Result<f64, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::Validation {
            field: "value".to_string(),
            message: format!("gauge {name} is not a finite number ({v})"),
        })
    }
}

/// Add `delta` to a counter total, refusing to wrap.
pub fn checked_total(name: &str, total: i64, delta: i64) -> Result<i64, CoreError> {
    total
        .checked_add(delta)
        .ok_or_else(|| CoreError::Validation {
            field: "delta".to_string(),
            message: format!("counter {name} overflows: {total} + {delta}"),
        })
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

/// Full `{gauges, counters}` content at one instant.
///
/// Both maps are always present; a missing key in JSON deserializes as an
/// empty map. Entries are ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Gauge name → latest value
    #[serde(rename = "Gauges", default)]
    pub gauges: BTreeMap<String, f64>,
    /// Counter name → running total
    #[serde(rename = "Counters", default)]
    pub counters: BTreeMap<String, i64>,
}

impl Snapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// No gauges and no counters
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    /// Total number of entries across both namespaces
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Fold one value in with the merge rule: gauge overwrite, counter add.
    ///
    /// Non-finite gauges and overflowing counters are rejected and leave the
    /// snapshot unchanged.
    pub fn merge_value(&mut self, name: &str, value: MetricValue) -> Result<(), CoreError> {
        match value {
            MetricValue::Gauge(v) => {
                self.gauges.insert(name.to_string(), finite_gauge(name, v)?);
            }
            MetricValue::Counter(d) => {
                let total = self.counters.get(name).copied().unwrap_or(0);
                let total = checked_total(name, total, d)?;
                self.counters.insert(name.to_string(), total);
            }
        }
        Ok(())
    }

    /// Fold a whole snapshot in with the merge rule.
    ///
    /// All-or-nothing: on error `self` is left as it was.
    pub fn merge(&mut self, other: &Snapshot) -> Result<(), CoreError> {
        let mut merged = self.clone();
        for (name, v) in &other.gauges {
            merged.merge_value(name, MetricValue::Gauge(*v))?;
        }
        for (name, d) in &other.counters {
            merged.merge_value(name, MetricValue::Counter(*d))?;
        }
        *self = merged;
        Ok(())
    }

    /// Every gauge is finite, so the snapshot serializes to JSON that
    /// parses back.
    pub fn check_finite(&self) -> Result<(), CoreError> {
        for (name, v) in &self.gauges {
            finite_gauge(name, *v)?;
        }
        Ok(())
    }

    /// Value in one namespace
    pub fn get(&self, kind: MetricKind, name: &str) -> Option<MetricValue> {
        match kind {
            MetricKind::Gauge => self.gauges.get(name).copied().map(MetricValue::Gauge),
            MetricKind::Counter => self.counters.get(name).copied().map(MetricValue::Counter),
        }
    }

    /// Builder-style gauge insert (mostly for fixtures and sources)
    pub fn with_gauge(mut self, name: &str, value: f64) -> Self {
        self.gauges.insert(name.to_string(), value);
        self
    }

    /// Builder-style counter insert
    pub fn with_counter(mut self, name: &str, delta: i64) -> Self {
        self.counters.insert(name.to_string(), delta);
        self
    }
}
