//! Backend health check.

use axum::extract::State;

use crate::error::ApiError;
use crate::AppState;

/// GET /ping
pub async fn ping(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.backend.ping().await.map_err(|e| {
        ApiError::Internal(format!("{} backend unreachable: {e}", state.backend.name()))
    })?;
    Ok("ok")
}
