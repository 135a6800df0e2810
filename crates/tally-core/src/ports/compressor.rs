//! Payload codec port.
//!
//! Implementation: `tally-network` crate (flate2 gzip). The collector also
//! accepts an optional codec for inbound bodies, which is where an
//! asymmetric-encryption layer would plug in.

use crate::error::CoreError;

/// Whole-body transform applied after serialization and before transport
pub trait PayloadCodec: Send + Sync {
    /// Transform an outgoing body
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CoreError>;

    /// Reverse [`PayloadCodec::encode`]
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CoreError>;

    /// Value for the `Content-Encoding` header, `None` for an opaque codec
    fn content_encoding(&self) -> Option<&'static str> {
        None
    }
}

/// Codec that passes bytes through untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl PayloadCodec for IdentityCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        Ok(data.to_vec())
    }
}
