//! hl7-minato server — HTTP shell around the intake core.

pub mod audit;
pub mod auth;
pub mod config;
pub mod handlers;

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use minato_client::FhirStore;
use minato_core::{MappingSpec, ValidationSpec};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Shared application state: configuration and the specs loaded once at
/// startup, all read-only afterwards. Concurrent requests share it
/// without locking.
pub struct AppState {
    pub config: config::ServerConfig,
    pub mapping_spec: MappingSpec,
    pub validation_spec: ValidationSpec,
    /// Outbound FHIR store, present when a base URL is configured.
    pub store: Option<FhirStore>,
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/token", post(auth::issue_token))
        .route("/hl7/inbound", post(handlers::inbound::inbound))
        .route("/fhir/{resource_type}", get(handlers::proxy::search))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // HL7 payloads are small
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
