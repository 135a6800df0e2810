//! # tally-core
//!
//! Metric model, live store, sync protocol, port traits and error type
//! shared by every tally crate.
//!
//! ## Layout
//!
//! - [`models`]: `MetricKind`, `MetricValue`, `Snapshot`, `MetricRecord`
//! - [`store`]: concurrent in-memory `MetricStore`
//! - [`protocol`]: batch encode/verify/apply with optional HMAC integrity
//! - [`ports`]: hexagonal port traits (async_trait)
//! - [`error`]: `CoreError` (thiserror)
//! - [`config`]: agent and collector settings

pub mod config;
pub mod error;
pub mod models;
pub mod ports;
pub mod protocol;
pub mod store;
