//! GET /fhir/{resourceType} — read-only proxy to the FHIR store.
//!
//! Writes go through the intake pipeline, never through the proxy;
//! axum answers 405 for any other method on this route.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use minato_core::OperationOutcome;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::AppState;

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(resource_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(store) = &state.store else {
        let outcome = OperationOutcome::not_supported("no FHIR store is configured");
        return (StatusCode::NOT_IMPLEMENTED, Json(json!(outcome))).into_response();
    };

    tracing::info!(resource_type = %resource_type, "FHIR proxy search");

    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    match store.search(&resource_type, &params).await {
        Ok(bundle) => (StatusCode::OK, Json(bundle)).into_response(),
        Err(e) => {
            tracing::error!(resource_type = %resource_type, error = %e, "FHIR proxy search failed");
            let outcome = OperationOutcome::upstream_failure(e.to_string());
            (StatusCode::BAD_GATEWAY, Json(json!(outcome))).into_response()
        }
    }
}
