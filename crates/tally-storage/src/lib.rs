//! # tally-storage
//!
//! Persistence backends and the snapshot scheduler.
//!
//! ## Modules
//! - `memory`: backend over the live `MetricStore`
//! - `file`: whole-file JSON snapshot backend
//! - `sqlite`: relational backend (rusqlite)
//! - `migration`: schema migration
//! - `snapshot_scheduler`: restore-on-start, periodic and shutdown flush

pub mod file;
pub mod memory;
pub mod migration;
pub mod snapshot_scheduler;
pub mod sqlite;
