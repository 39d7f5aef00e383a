//! POST /hl7/inbound — the intake pipeline.
//!
//! parse → validate → map → (optional) store upsert → assemble.
//! Mapping never proceeds on an invalid message; rejection responses
//! carry an OperationOutcome built 1:1 from the defects.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use minato_core::{
    MappedResources, Message, OperationOutcome, SystemClock, assemble,
    bundle::coverage_has_identity, map, validate,
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::audit::{self, AuditContext};

/// Largest accepted HL7 payload.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn inbound(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let context = AuditContext::from_request(&request);

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return bad_request(OperationOutcome::invalid_payload(format!(
                "unreadable body: {e}"
            )));
        }
    };
    let Ok(text) = std::str::from_utf8(&body) else {
        return bad_request(OperationOutcome::invalid_payload("body is not valid UTF-8"));
    };

    audit::log_inbound_received(&context, text.len());

    let message = match Message::parse(text) {
        Ok(message) => message,
        Err(e) => {
            audit::log_inbound_rejected(&context, "", &e.to_string());
            return bad_request(OperationOutcome::invalid_payload(e.to_string()));
        }
    };

    let report = validate(&message, &state.validation_spec);
    if !report.valid {
        audit::log_inbound_rejected(&context, &report.message_type, "validation failed");
        return bad_request(report.to_operation_outcome());
    }

    let mapped = map(&message, &state.mapping_spec, &SystemClock);

    let patient_ref = match upsert(&state, &context, &mapped).await {
        Ok(reference) => reference,
        Err(outcome) => {
            audit::log_inbound_rejected(&context, &report.message_type, "store upsert failed");
            return (StatusCode::BAD_GATEWAY, Json(json!(outcome))).into_response();
        }
    };

    let bundle = assemble(
        mapped.patient,
        mapped.coverage,
        mapped.observations,
        patient_ref.as_deref(),
    );
    audit::log_inbound_accepted(&context, &report.message_type, bundle.entry.len());
    (StatusCode::OK, Json(json!(bundle))).into_response()
}

/// Push the Patient (update-or-create by MRN) and Coverage to the store
/// when upsert is enabled; returns the store-assigned Patient reference.
async fn upsert(
    state: &AppState,
    context: &AuditContext,
    mapped: &MappedResources,
) -> Result<Option<String>, OperationOutcome> {
    if !state.config.store.upsert {
        return Ok(None);
    }
    let Some(store) = &state.store else {
        return Ok(None);
    };

    let identifier = mapped
        .patient
        .get("identifier")
        .and_then(|identifiers| identifiers.get(0));
    let (Some(system), Some(value)) = (
        identifier
            .and_then(|id| id.get("system"))
            .and_then(Value::as_str),
        identifier
            .and_then(|id| id.get("value"))
            .and_then(Value::as_str),
    ) else {
        return Ok(None);
    };

    let existing = store
        .find_by_identifier("Patient", system, value)
        .await
        .map_err(upstream)?;

    let reference = match existing {
        Some(found) => {
            let id = found
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            // Mapped fields win over what the store already holds
            let mut merged = found;
            if let (Some(target), Some(fields)) =
                (merged.as_object_mut(), mapped.patient.as_object())
            {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            store.update("Patient", &id, &merged).await.map_err(upstream)?;
            format!("Patient/{id}")
        }
        None => {
            let created = store
                .create("Patient", &mapped.patient)
                .await
                .map_err(upstream)?;
            let id = created.get("id").and_then(Value::as_str).unwrap_or_default();
            format!("Patient/{id}")
        }
    };
    audit::log_upsert(context, "Patient", &reference);

    if coverage_has_identity(&mapped.coverage) {
        let mut coverage = mapped.coverage.clone();
        if let Some(map) = coverage.as_object_mut() {
            map.insert("beneficiary".to_string(), json!({ "reference": reference }));
        }
        // Coverage push is best-effort: the Bundle still carries it
        if let Err(e) = store.create("Coverage", &coverage).await {
            tracing::warn!(
                target: "audit",
                message_id = %context.message_id,
                error = %e,
                "Coverage push failed"
            );
        }
    }

    Ok(Some(reference))
}

fn upstream(error: minato_client::StoreError) -> OperationOutcome {
    OperationOutcome::upstream_failure(error.to_string())
}

fn bad_request(outcome: OperationOutcome) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!(outcome))).into_response()
}
