//! Structured audit logging.
//!
//! Every inbound message and auth attempt is logged under the `audit`
//! target with stable field names, so the audit stream can be filtered
//! from the main log by target alone.

use axum::extract::Request;

use crate::auth::AuthClient;

/// Who is doing what, attached to every audited event.
#[derive(Debug, Clone)]
pub struct AuditContext {
    /// Gateway-assigned id for this inbound message.
    pub message_id: String,
    /// Authenticated client, when auth is enabled.
    pub client_id: Option<String>,
}

impl AuditContext {
    pub fn from_request(request: &Request) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            client_id: request
                .extensions()
                .get::<AuthClient>()
                .map(|client| client.client_id.clone()),
        }
    }

    fn client(&self) -> &str {
        self.client_id.as_deref().unwrap_or("anonymous")
    }
}

pub fn log_inbound_received(context: &AuditContext, bytes: usize) {
    tracing::info!(
        target: "audit",
        message_id = %context.message_id,
        client_id = context.client(),
        bytes,
        "HL7 message received"
    );
}

pub fn log_inbound_rejected(context: &AuditContext, message_type: &str, reason: &str) {
    tracing::warn!(
        target: "audit",
        message_id = %context.message_id,
        client_id = context.client(),
        message_type,
        reason,
        "HL7 message rejected"
    );
}

pub fn log_inbound_accepted(context: &AuditContext, message_type: &str, entries: usize) {
    tracing::info!(
        target: "audit",
        message_id = %context.message_id,
        client_id = context.client(),
        message_type,
        entries,
        "FHIR Bundle returned"
    );
}

pub fn log_upsert(context: &AuditContext, resource_type: &str, reference: &str) {
    tracing::info!(
        target: "audit",
        message_id = %context.message_id,
        client_id = context.client(),
        resource_type,
        reference,
        "store upsert completed"
    );
}

pub fn log_auth_attempt(client_id: &str, success: bool) {
    if success {
        tracing::info!(target: "audit", client_id, "token issued");
    } else {
        tracing::warn!(target: "audit", client_id, "token request rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_without_auth_is_anonymous() {
        let context = AuditContext {
            message_id: "m-1".to_string(),
            client_id: None,
        };
        assert_eq!(context.client(), "anonymous");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let request = Request::new(axum::body::Body::empty());
        let first = AuditContext::from_request(&request);
        let second = AuditContext::from_request(&request);
        assert_ne!(first.message_id, second.message_id);
    }
}
