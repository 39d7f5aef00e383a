//! HTTP handlers.

pub mod inbound;
pub mod proxy;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

/// GET /health — liveness probe, auth-free.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "minato-intake" })),
    )
}
