//! Metric writes: path form, single JSON record and agent batches.

use std::slice;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tally_core::models::metric::{MetricKind, MetricValue};
use tally_core::models::record::MetricRecord;
use tracing::debug;

use super::parse_json;
use crate::error::ApiError;
use crate::AppState;

/// `POST /updates/` response
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Number of records merged
    pub accepted: usize,
}

/// POST /update/{kind}/{name}/{value}
pub async fn update_from_path(
    State(state): State<AppState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let value = MetricValue::parse(kind, &raw)?;

    state.backend.put(&name, value).await?;
    state.after_write().await;
    Ok(StatusCode::OK)
}

/// POST /update/
///
/// Merges one record and answers with the resulting current value.
pub async fn update_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let record: MetricRecord = parse_json(&body)?;
    let batch = state.codec.decode(slice::from_ref(&record))?;

    state.backend.put_metrics(&batch).await?;
    state.after_write().await;

    let current = state.backend.get_typed(record.kind, &record.id).await?;
    let mut out = MetricRecord::from_value(record.id, current);
    state.codec.sign(&mut out)?;
    Ok(Json(out))
}

/// POST /updates/
///
/// All-or-nothing: one invalid or tampered record rejects the batch.
pub async fn update_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchResponse>, ApiError> {
    let records: Vec<MetricRecord> = match &state.inbound {
        Some(codec) => parse_json(&codec.decode(&body)?)?,
        None => parse_json(&body)?,
    };

    let accepted = state
        .codec
        .apply_to_backend(state.backend.as_ref(), &records)
        .await?;
    state.after_write().await;

    debug!("batch applied: {accepted} records");
    Ok(Json(BatchResponse { accepted }))
}
