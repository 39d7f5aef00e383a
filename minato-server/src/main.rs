//! hl7-minato — HL7 v2 → FHIR intake gateway entry point

use minato_client::{FhirStore, StoreConfig};
use minato_core::{MappingSpec, ValidationSpec};
use minato_server::{AppState, build_router, config::ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting hl7-minato gateway...");

    // Load configuration
    let config = ServerConfig::load(
        std::path::Path::new("config.yaml")
            .exists()
            .then_some("config.yaml"),
    )
    .unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        ServerConfig::default()
    });

    // Specs are versioned configuration: refuse to start on any defect
    let mapping_spec = MappingSpec::from_file(&config.specs.mapping_file).unwrap_or_else(|e| {
        tracing::error!("Failed to load mapping spec: {}", e);
        std::process::exit(1);
    });
    let validation_spec =
        ValidationSpec::from_file(&config.specs.validation_file).unwrap_or_else(|e| {
            tracing::error!("Failed to load validation spec: {}", e);
            std::process::exit(1);
        });

    let store = if config.store.base_url.is_empty() {
        if config.store.upsert {
            tracing::error!("store.upsert is enabled but store.base_url is not set");
            std::process::exit(1);
        }
        None
    } else {
        Some(FhirStore::new(StoreConfig {
            base_url: config.store.base_url.clone(),
            client_id: config.store.client_id.clone(),
            client_secret: config.store.client_secret.clone(),
            scope: config.store.scope.clone(),
            retry: config.store.retry.policy(),
        }))
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(
        "Auth: {}, store upsert: {}",
        if config.auth.enabled {
            "enabled"
        } else {
            "disabled"
        },
        if config.store.upsert {
            "enabled"
        } else {
            "disabled"
        }
    );

    let state = Arc::new(AppState {
        config,
        mapping_spec,
        validation_spec,
        store,
    });

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Server error: {}", e);
    });

    tracing::info!("Gateway shut down gracefully");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
