//! Bearer-token issuance and verification.
//!
//! The gateway is its own issuer: registered clients obtain HS256
//! tokens via the client-credentials grant, and the middleware verifies
//! them against the same shared secret, issuer and audience.

use axum::{
    Json,
    body::Body,
    extract::{Form, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use minato_core::OperationOutcome;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::{AppState, audit};

/// Claims carried by gateway-issued tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Authenticated client, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthClient {
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// POST /auth/token — OAuth2 client-credentials grant.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Form(request): Form<TokenRequest>,
) -> Response {
    if request.grant_type != "client_credentials" {
        tracing::warn!(grant_type = %request.grant_type, "unsupported grant type");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response();
    }

    let client = state.config.auth.clients.iter().find(|client| {
        client.client_id == request.client_id && client.client_secret == request.client_secret
    });
    let Some(client) = client else {
        audit::log_auth_attempt(&request.client_id, false);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_client" })),
        )
            .into_response();
    };

    let jwt = &state.config.auth.jwt;
    let now = Utc::now().timestamp() as u64;
    let claims = Claims {
        iss: jwt.issuer.clone(),
        aud: jwt.audience.clone(),
        sub: client.client_id.clone(),
        iat: now,
        exp: now + jwt.token_ttl_secs,
        scope: client.scope.clone(),
    };

    let token = match jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    ) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "token signing failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "server_error" })),
            )
                .into_response();
        }
    };

    audit::log_auth_attempt(&client.client_id, true);
    (
        StatusCode::OK,
        Json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": jwt.token_ttl_secs,
        })),
    )
        .into_response()
}

/// Scope required for a request path, if any.
fn required_scope(path: &str) -> Option<&'static str> {
    if path.starts_with("/hl7") {
        Some("hl7.ingest")
    } else if path.starts_with("/fhir") {
        Some("fhir.read")
    } else {
        None
    }
}

/// Bearer verification for everything except the public endpoints.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if !state.config.auth.enabled {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    if path == "/health" || path.starts_with("/auth/") {
        return Ok(next.run(request).await);
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(header_value) = header_value else {
        return Err(unauthorized("Missing Authorization header"));
    };
    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return Err(unauthorized("Expected 'Bearer <token>'"));
    };

    let jwt = &state.config.auth.jwt;
    let mut validation = Validation::default();
    validation.set_issuer(&[&jwt.issuer]);
    validation.set_audience(&[&jwt.audience]);

    match jsonwebtoken::decode::<Claims>(
        token.trim(),
        &DecodingKey::from_secret(jwt.secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => {
            let client = AuthClient {
                client_id: data.claims.sub,
                scopes: data
                    .claims
                    .scope
                    .split_whitespace()
                    .map(String::from)
                    .collect(),
            };
            if let Some(scope) = required_scope(&path)
                && !client.scopes.iter().any(|held| held == scope)
            {
                return Err(forbidden(format!("token lacks scope '{scope}'")));
            }
            request.extensions_mut().insert(client);
            Ok(next.run(request).await)
        }
        Err(e) => Err(unauthorized(format!("Invalid token: {e}"))),
    }
}

fn unauthorized(diagnostics: impl Into<String>) -> Response {
    let outcome = OperationOutcome::unauthorized(diagnostics);
    (StatusCode::UNAUTHORIZED, Json(json!(outcome))).into_response()
}

fn forbidden(diagnostics: impl Into<String>) -> Response {
    let outcome = OperationOutcome::forbidden(diagnostics);
    (StatusCode::FORBIDDEN, Json(json!(outcome))).into_response()
}
