//! Collector request handlers.

pub mod health;
pub mod listing;
pub mod update;
pub mod value;

use serde::de::DeserializeOwned;
use tally_core::error::CoreError;

use crate::error::ApiError;

/// Parse a JSON body, mapping any failure to 400.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::from(CoreError::Serialization(e)))
}
