//! Tally domain models.
//!
//! The metric value types, the `Snapshot` container shared by the store, the
//! wire and the snapshot file, and the flattened wire record.

pub mod metric;
pub mod record;
