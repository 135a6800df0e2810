//! Single-metric reads.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tally_core::models::metric::MetricKind;
use tally_core::models::record::MetricRecord;

use super::parse_json;
use crate::error::ApiError;
use crate::AppState;

/// `POST /value/` body
#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    /// Metric name
    pub id: String,
    /// Namespace to search
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// GET /value/{kind}/{name}
///
/// Plain-text value. Gauges print in shortest round-trip form.
pub async fn value_from_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let value = state.backend.get_typed(kind, &name).await?;
    Ok(value.to_string())
}

/// POST /value/
///
/// Full record out, signed when the collector has a key.
pub async fn value_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let req: ValueRequest = parse_json(&body)?;
    let value = state.backend.get_typed(req.kind, &req.id).await?;

    let mut record = MetricRecord::from_value(req.id, value);
    state.codec.sign(&mut record)?;
    Ok(Json(record))
}
