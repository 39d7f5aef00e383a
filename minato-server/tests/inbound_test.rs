//! End-to-end intake flow tests
//!
//! token issuance -> authenticated inbound POST -> Bundle, plus the
//! rejection paths (malformed payload, unsupported type, missing auth).

use minato_core::{MappingSpec, ValidationSpec};
use minato_server::{
    AppState, build_router,
    config::{ClientCredential, ServerConfig},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

const MAPPING_JSON: &str = include_str!("../../specs/mapping.json");
const VALIDATION_JSON: &str = include_str!("../../specs/validation.json");

const SAMPLE_A04: &str = "MSH|^~\\&|SendingApp|SendingFac|ReceivingApp|ReceivingFac|202501011230||ADT^A04|MSG00001|P|2.5\rEVN|A04|202501011230\rPID|1||12345^^^Hospital^MR||Doe^John||19800101|M\rIN1|1|PLAN123^Gold\rOBX|1|NM|8867-4^Heart rate^LN||72|bpm^^UCUM|||||F|||202501011200\rOBX|2|ST|NOTE^Comment||patient stable\r";

async fn start_test_server(auth_enabled: bool) -> String {
    let mut config = ServerConfig::default();
    config.auth.enabled = auth_enabled;
    config.auth.clients = vec![ClientCredential {
        client_id: "tester".to_string(),
        client_secret: "secret".to_string(),
        scope: "hl7.ingest".to_string(),
    }];

    let state = Arc::new(AppState {
        config,
        mapping_spec: MappingSpec::from_json(MAPPING_JSON).unwrap(),
        validation_spec: ValidationSpec::from_json(VALIDATION_JSON).unwrap(),
        store: None,
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_check() {
    let base_url = start_test_server(false).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_inbound_returns_transaction_bundle() {
    let base_url = start_test_server(false).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .header("Content-Type", "application/hl7-v2")
        .body(SAMPLE_A04)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let bundle: Value = resp.json().await.unwrap();
    assert_eq!(bundle["resourceType"], "Bundle");
    assert_eq!(bundle["type"], "transaction");

    // Patient + Coverage + 2 Observations
    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 4);

    let patient = &entries[0]["resource"];
    assert_eq!(patient["resourceType"], "Patient");
    assert_eq!(patient["identifier"][0]["system"], "Hospital");
    assert_eq!(patient["identifier"][0]["value"], "12345");
    assert_eq!(patient["gender"], "male");
    assert_eq!(patient["birthDate"], "1980-01-01");
    assert_eq!(entries[0]["request"]["method"], "POST");
    assert_eq!(entries[0]["request"]["url"], "Patient");

    let coverage = &entries[1]["resource"];
    assert_eq!(coverage["resourceType"], "Coverage");
    assert_eq!(coverage["identifier"][0]["value"], "PLAN123");

    let observation = &entries[2]["resource"];
    assert_eq!(observation["resourceType"], "Observation");
    assert_eq!(observation["valueQuantity"]["value"], 72);
    assert_eq!(observation["effectiveDateTime"], "2025-01-01T12:00:00Z");
    assert_eq!(entries[3]["resource"]["valueString"], "patient stable");
}

#[tokio::test]
async fn test_inbound_without_in1_drops_coverage() {
    let base_url = start_test_server(false).await;
    let client = reqwest::Client::new();

    let message = "MSH|^~\\&|App|Fac|R|F|202501011230||ADT^A08|MSG2|P|2.5\rPID|1||77777^^^Hospital^MR||Roe^Jane||19900214|F\r";
    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .header("Content-Type", "text/plain")
        .body(message)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let bundle: Value = resp.json().await.unwrap();
    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["resource"]["resourceType"], "Patient");
    assert_eq!(entries[0]["resource"]["gender"], "female");
}

#[tokio::test]
async fn test_malformed_payload_rejected() {
    let base_url = start_test_server(false).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .header("Content-Type", "text/plain")
        .body("this is not HL7")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["code"], "invalid");
}

#[tokio::test]
async fn test_unsupported_message_type_rejected() {
    let base_url = start_test_server(false).await;
    let client = reqwest::Client::new();

    let message = "MSH|^~\\&|App|Fac|R|F|202501011230||ORM^O01|MSG3|P|2.5\rPID|1||12345\r";
    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .body(message)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "not-supported");
    assert!(
        outcome["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("ORM^O01")
    );
}

#[tokio::test]
async fn test_missing_required_segment_rejected() {
    let base_url = start_test_server(false).await;
    let client = reqwest::Client::new();

    let message = "MSH|^~\\&|App|Fac|R|F|202501011230||ADT^A04|MSG4|P|2.5\r";
    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .body(message)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "structure");
    assert!(
        outcome["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("PID")
    );
}

#[tokio::test]
async fn test_inbound_requires_auth_when_enabled() {
    let base_url = start_test_server(true).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .body(SAMPLE_A04)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_token_flow() {
    let base_url = start_test_server(true).await;
    let client = reqwest::Client::new();

    // Wrong secret is rejected
    let resp = client
        .post(format!("{}/auth/token", base_url))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "tester"),
            ("client_secret", "wrong"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_client");

    // Wrong grant type is rejected
    let resp = client
        .post(format!("{}/auth/token", base_url))
        .form(&[
            ("grant_type", "password"),
            ("client_id", "tester"),
            ("client_secret", "secret"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Valid credentials issue a bearer token
    let resp = client
        .post(format!("{}/auth/token", base_url))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "tester"),
            ("client_secret", "secret"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    let token = body["access_token"].as_str().unwrap().to_string();

    // The token opens the inbound endpoint
    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .bearer_auth(&token)
        .body(SAMPLE_A04)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // A garbage token does not
    let resp = client
        .post(format!("{}/hl7/inbound", base_url))
        .bearer_auth("not-a-jwt")
        .body(SAMPLE_A04)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // The token's scope covers /hl7 but not /fhir
    let resp = client
        .get(format!("{}/fhir/Patient", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}
