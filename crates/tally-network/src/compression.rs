//! Gzip payload codec.
//!
//! `PayloadCodec` implementation over flate2. Used by the agent transport
//! for request bodies and by the collector for bodies that arrive without a
//! `Content-Encoding` header.

use std::io::Read;

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use tally_core::error::CoreError;
use tally_core::ports::compressor::PayloadCodec;

/// gzip codec with a configurable level
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    /// Default compression level
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Explicit level, 0 (store) to 9 (best)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadCodec for GzipCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut encoder = GzEncoder::new(data, self.level);
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| CoreError::Internal(format!("gzip compression failed: {e}")))?;
        Ok(compressed)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).map_err(|e| CoreError::Validation {
            field: "body".to_string(),
            message: format!("gzip decompression failed: {e}"),
        })?;
        Ok(decompressed)
    }

    fn content_encoding(&self) -> Option<&'static str> {
        Some("gzip")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_roundtrip() {
        let codec = GzipCodec::new();
        let data = br#"[{"id":"PollCount","type":"counter","delta":1}]"#;
        let compressed = codec.encode(data).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(codec.decode(&compressed).unwrap(), data.to_vec());
    }

    #[test]
    fn repetitive_batch_shrinks() {
        let codec = GzipCodec::with_level(9);
        let data = r#"{"id":"CPUutilization1","type":"gauge","value":12.5},"#.repeat(64);
        let compressed = codec.encode(data.as_bytes()).unwrap();
        assert!(compressed.len() < data.len() / 4);
    }

    #[test]
    fn garbage_input_is_validation_error() {
        let codec = GzipCodec::new();
        assert!(matches!(
            codec.decode(b"definitely not gzip"),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn advertises_gzip_encoding() {
        assert_eq!(GzipCodec::new().content_encoding(), Some("gzip"));
    }
}
