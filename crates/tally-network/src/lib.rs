//! # tally-network
//!
//! Agent-side network adapters.
//!
//! - `http_client`: `MetricsTransport` over reqwest, posting to `/updates/`
//! - `compression`: gzip `PayloadCodec` (flate2)

pub mod compression;
pub mod http_client;
