//! Webhook contract: signature gate and event envelope parsing.

use std::time::Duration;

use chrono::Utc;
use stormesh_backend::config::ProcessorConfig;
use stormesh_backend::error::AppError;
use stormesh_backend::services::processor::{sign_payload, ProcessorClient};

const WEBHOOK_SECRET: &str = "whsec_integration_secret";

fn client() -> ProcessorClient {
    ProcessorClient::new(&ProcessorConfig {
        secret_key: "sk_test".to_string(),
        publishable_key: "pk_test".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        base_url: "https://api.payproc.example".to_string(),
        timeout: Duration::from_secs(5),
        session_ttl: Duration::from_secs(1800),
    })
    .expect("client builds")
}

fn header_for(payload: &[u8]) -> String {
    let now = Utc::now().timestamp();
    format!("t={},v1={}", now, sign_payload(WEBHOOK_SECRET, now, payload))
}

#[test]
fn a_correctly_signed_event_passes_verification() {
    let client = client();
    let payload = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
    let header = header_for(payload);
    assert!(client.verify_signature(payload, &header).is_ok());
}

#[test]
fn a_forged_signature_is_rejected_with_the_stable_code() {
    let client = client();
    let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
    let now = Utc::now().timestamp();
    let header = format!(
        "t={},v1={}",
        now,
        sign_payload("some-other-secret", now, payload)
    );
    let err = client.verify_signature(payload, &header).unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));
    assert_eq!(err.code(), "INVALID_SIGNATURE");
    assert_eq!(err.status_code().as_u16(), 400);
}

#[test]
fn replaying_the_same_signed_body_verifies_again() {
    // Redelivery presents identical bytes and header; verification is pure,
    // so idempotency is the handlers' job, not the gate's.
    let client = client();
    let payload = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
    let header = header_for(payload);
    assert!(client.verify_signature(payload, &header).is_ok());
    assert!(client.verify_signature(payload, &header).is_ok());
}

#[test]
fn event_metadata_carries_the_order_linkage() {
    let client = client();
    let payload = br#"{
        "id": "evt_2",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_2",
            "payment_intent": "pi_2",
            "metadata": {
                "orderId": "0b9cf24e-7c63-4e7a-9f25-61c2c3b1a111",
                "paymentId": "1c8de35f-8d74-4f8b-a036-72d3d4c2b222",
                "userId": "2d9ef460-9e85-4a9c-b147-83e4e5d3c333",
                "planId": "3eaf0571-af96-4bad-c258-94f5f6e4d444"
            }
        }}
    }"#;
    let event = client.parse_event(payload).unwrap();
    assert_eq!(event.event_type, "checkout.session.completed");
    assert_eq!(event.object_id(), Some("cs_2"));
    assert_eq!(event.payment_intent_id(), Some("pi_2"));
    assert!(event.metadata_uuid("orderId").is_some());
    assert!(event.metadata_uuid("paymentId").is_some());
    assert!(event.metadata_uuid("missing").is_none());
}

#[test]
fn intent_failure_events_expose_the_processor_message() {
    let client = client();
    let payload = br#"{
        "id": "evt_3",
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": "pi_3",
            "last_payment_error": { "message": "card_declined" }
        }}
    }"#;
    let event = client.parse_event(payload).unwrap();
    assert_eq!(event.failure_message(), Some("card_declined"));
}

#[test]
fn error_codes_exposed_at_the_boundary_are_stable() {
    assert_eq!(AppError::PlanNotFound.code(), "PLAN_NOT_FOUND");
    assert_eq!(AppError::PlanUnavailable.code(), "PLAN_UNAVAILABLE");
    assert_eq!(AppError::UserNotFound.code(), "USER_NOT_FOUND");
    assert_eq!(
        AppError::InvalidOrderStatus {
            expected: "PAYMENT_COMPLETED".to_string(),
            found: "CANCELLED".to_string(),
        }
        .code(),
        "INVALID_ORDER_STATUS"
    );
    assert_eq!(
        AppError::MaxRetries {
            tx_id: "tx".to_string()
        }
        .code(),
        "MAX_RETRIES"
    );
    assert_eq!(AppError::RateLimitExceeded.status_code().as_u16(), 429);
}
