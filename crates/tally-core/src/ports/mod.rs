//! Port interfaces (traits).
//!
//! Hexagonal port layer. Each adapter crate implements these traits and the
//! `tally-app` binaries wire them together as `Arc<dyn T>`.
//!
//! Every async trait uses the `async_trait` macro so it stays object safe.

pub mod compressor;
pub mod monitor;
pub mod persistence;
pub mod transport;
