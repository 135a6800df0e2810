//! Collector route table.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::AppState;

/// Collector routes
pub fn collector_routes() -> Router<AppState> {
    Router::new()
        // listing and health
        .route("/", get(handlers::listing::list_metrics))
        .route("/ping", get(handlers::health::ping))
        // writes
        .route(
            "/update/{kind}/{name}/{value}",
            post(handlers::update::update_from_path),
        )
        .route("/update/", post(handlers::update::update_json))
        .route("/updates/", post(handlers::update::update_batch))
        // reads
        .route("/value/{kind}/{name}", get(handlers::value::value_from_path))
        .route("/value/", post(handlers::value::value_json))
}
