//! HTTP transport to the collector.
//!
//! `MetricsTransport` port implementation. One POST of the whole batch to
//! `/updates/` per call with a bounded timeout. Failed sends are not retried:
//! batches carry no sequence number, so a resend after a lost response
//! would add counter deltas twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tally_core::error::CoreError;
use tally_core::models::record::MetricRecord;
use tally_core::ports::compressor::PayloadCodec;
use tally_core::ports::transport::MetricsTransport;
use tracing::debug;

/// Batch endpoint path
pub const UPDATES_PATH: &str = "/updates/";

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    codec: Option<Arc<dyn PayloadCodec>>,
}

impl HttpTransport {
    /// New transport for `base_url` (scheme included)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            codec: None,
        })
    }

    /// Transform every request body with `codec` (gzip, encryption)
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Collector base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map a non-success status to `CoreError`.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_else(|e| {
            tracing::warn!("failed to read response body: {e}");
            String::new()
        });

        match status.as_u16() {
            400 => Err(CoreError::Validation {
                field: "batch".to_string(),
                message: format!("collector rejected batch: {}", text.trim()),
            }),
            _ => Err(CoreError::Network(format!(
                "collector returned {status}: {}",
                text.trim()
            ))),
        }
    }
}

#[async_trait]
impl MetricsTransport for HttpTransport {
    async fn send_batch(&self, records: &[MetricRecord]) -> Result<(), CoreError> {
        let json = serde_json::to_vec(records)?;
        let raw_len = json.len();

        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, UPDATES_PATH))
            .header(CONTENT_TYPE, "application/json");

        let body = match &self.codec {
            Some(codec) => {
                if let Some(encoding) = codec.content_encoding() {
                    req = req.header(CONTENT_ENCODING, encoding);
                }
                codec.encode(&json)?
            }
            None => json,
        };

        debug!(
            "sending batch: {} records, {} bytes ({} on the wire)",
            records.len(),
            raw_len,
            body.len()
        );

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("batch request failed: {e}")))?;

        Self::check_response(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::compression::GzipCodec;

    fn records() -> Vec<MetricRecord> {
        vec![
            MetricRecord::gauge("Alloc", 3407240.0),
            MetricRecord::counter("PollCount", 1),
        ]
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let transport =
            HttpTransport::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn send_plain_json_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!([
                {"id": "Alloc", "type": "gauge", "value": 3407240.0},
                {"id": "PollCount", "type": "counter", "delta": 1}
            ])))
            .with_status(200)
            .with_body(r#"{"accepted":2}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
        transport.send_batch(&records()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_gzip_batch_sets_content_encoding() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .match_header("content-encoding", "gzip")
            .with_status(200)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5))
            .unwrap()
            .with_codec(Arc::new(GzipCodec::new()));
        transport.send_batch(&records()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_batch_is_validation_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .with_status(400)
            .with_body("integrity hash mismatch for metric Alloc")
            .expect(1)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = transport.send_batch(&records()).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = transport.send_batch(&records()).await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_collector_is_network_error() {
        let transport =
            HttpTransport::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            transport.send_batch(&records()).await,
            Err(CoreError::Network(_))
        ));
    }
}
