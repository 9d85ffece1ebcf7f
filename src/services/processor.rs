//! Hosted-checkout payment processor client.
//!
//! The processor hosts the card form; this service only creates customers
//! and checkout sessions, re-fetches sessions, and verifies webhook
//! signatures. The signature header has the shape
//! `t=<unix>,v1=<hex hmac-sha256(secret, "{t}.{body}")>`.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

use crate::config::ProcessorConfig;
use crate::error::{AppError, AppResult};

/// Reject events whose timestamp drifts more than this from our clock.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl CheckoutSession {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCheckoutSession<'a> {
    pub customer_id: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
}

/// A verified webhook event: `{ id, type, data.object }`.
#[derive(Debug, Clone)]
pub struct ProcessorEvent {
    pub id: String,
    pub event_type: String,
    pub object: JsonValue,
}

impl ProcessorEvent {
    pub fn object_id(&self) -> Option<&str> {
        self.object.get("id").and_then(|v| v.as_str())
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.object.get("payment_intent").and_then(|v| v.as_str())
    }

    pub fn metadata_uuid(&self, key: &str) -> Option<Uuid> {
        self.object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.object
            .get("last_payment_error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
    }
}

pub struct ProcessorClient {
    http: Client,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
    session_ttl: Duration,
    max_retries: u32,
}

impl ProcessorClient {
    pub fn new(config: &ProcessorConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            session_ttl: config.session_ttl,
            max_retries: 2,
        })
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<AppError> = None;

        for attempt in 0..=self.max_retries {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.secret_key);
            if let Some(payload) = body {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            AppError::Payment {
                                message: format!("invalid processor response: {}", e),
                                retryable: false,
                            }
                        });
                    }
                    if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && attempt < self.max_retries
                    {
                        warn!(status = %status, attempt = attempt + 1, "processor error, retrying");
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                    return Err(AppError::Payment {
                        message: format!("processor returned HTTP {}: {}", status, text),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    last_error = Some(AppError::ExternalService {
                        service: "payment processor".to_string(),
                        message: e.to_string(),
                    });
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::ExternalService {
            service: "payment processor".to_string(),
            message: "request failed".to_string(),
        }))
    }

    pub async fn create_customer(&self, email: &str) -> AppResult<ProcessorCustomer> {
        self.request_json(
            Method::POST,
            "/v1/customers",
            Some(&json!({ "email": email })),
        )
        .await
    }

    pub async fn create_checkout_session(
        &self,
        new: &NewCheckoutSession<'_>,
    ) -> AppResult<CheckoutSession> {
        let expires_at = Utc::now().timestamp() + self.session_ttl.as_secs() as i64;
        let payload = json!({
            "customer": new.customer_id,
            "mode": "payment",
            "line_items": [{
                "amount_cents": new.amount_cents,
                "currency": new.currency,
                "quantity": 1,
            }],
            "success_url": new.success_url,
            "cancel_url": new.cancel_url,
            "expires_at": expires_at,
            "metadata": {
                "orderId": new.order_id,
                "paymentId": new.payment_id,
                "userId": new.user_id,
                "planId": new.plan_id,
            },
        });
        self.request_json(Method::POST, "/v1/checkout/sessions", Some(&payload))
            .await
    }

    pub async fn retrieve_session(&self, session_id: &str) -> AppResult<Option<CheckoutSession>> {
        match self
            .request_json::<CheckoutSession>(
                Method::GET,
                &format!("/v1/checkout/sessions/{}", session_id),
                None,
            )
            .await
        {
            Ok(session) => Ok(Some(session)),
            Err(AppError::Payment { message, .. }) if message.contains("HTTP 404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Verify the raw webhook body against the signature header. Mandatory;
    /// unverifiable events are dropped by the caller.
    pub fn verify_signature(&self, payload: &[u8], header: &str) -> AppResult<()> {
        verify_signature_at(
            &self.webhook_secret,
            payload,
            header,
            Utc::now().timestamp(),
        )
    }

    pub fn parse_event(&self, payload: &[u8]) -> AppResult<ProcessorEvent> {
        let value: JsonValue = serde_json::from_slice(payload)
            .map_err(|e| AppError::validation(format!("invalid webhook JSON: {}", e)))?;
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let event_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::validation("webhook event has no type"))?
            .to_string();
        let object = value
            .get("data")
            .and_then(|d| d.get("object"))
            .cloned()
            .unwrap_or(JsonValue::Null);
        Ok(ProcessorEvent {
            id,
            event_type,
            object,
        })
    }
}

/// Compute the `v1` signature for a payload at a timestamp. Exposed for
/// webhook test fixtures.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_signature_at(secret: &str, payload: &[u8], header: &str, now: i64) -> AppResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidate: Option<&str> = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidate = Some(value),
            _ => {}
        }
    }

    let (timestamp, candidate) = match (timestamp, candidate) {
        (Some(t), Some(c)) => (t, c),
        _ => return Err(AppError::InvalidSignature),
    };

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::InvalidSignature);
    }

    let expected = sign_payload(secret, timestamp, payload);
    if secure_eq(expected.as_bytes(), candidate.trim().as_bytes()) {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn signed_header(payload: &[u8], timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, sign_payload(SECRET, timestamp, payload))
    }

    #[test]
    fn valid_signature_passes() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = signed_header(payload, now);
        assert!(verify_signature_at(SECRET, payload, &header, now).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = signed_header(payload, now);
        let tampered = br#"{"type":"checkout.session.expired"}"#;
        assert!(verify_signature_at(SECRET, tampered, &header, now).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = br#"{"type":"x"}"#;
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign_payload("other", now, payload));
        assert!(verify_signature_at(SECRET, payload, &header, now).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = br#"{"type":"x"}"#;
        let signed_at = 1_700_000_000;
        let header = signed_header(payload, signed_at);
        let now = signed_at + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(verify_signature_at(SECRET, payload, &header, now).is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        let payload = br#"{"type":"x"}"#;
        assert!(verify_signature_at(SECRET, payload, "", 0).is_err());
        assert!(verify_signature_at(SECRET, payload, "v1=abc", 0).is_err());
        assert!(verify_signature_at(SECRET, payload, "t=123", 123).is_err());
    }

    #[test]
    fn secure_eq_is_length_sensitive() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn event_parsing_extracts_type_and_object() {
        let payload = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "metadata": { "orderId": "5b2f7c3a-8a44-4d7e-9a59-111213141516" }
            }}
        }"#;
        let config = ProcessorConfig {
            secret_key: "sk".to_string(),
            publishable_key: "pk".to_string(),
            webhook_secret: SECRET.to_string(),
            base_url: "https://api.payproc.example".to_string(),
            timeout: Duration::from_secs(5),
            session_ttl: Duration::from_secs(1800),
        };
        let client = ProcessorClient::new(&config).unwrap();
        let event = client.parse_event(payload).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.object_id(), Some("cs_1"));
        assert_eq!(event.payment_intent_id(), Some("pi_1"));
        assert!(event.metadata_uuid("orderId").is_some());
        assert!(event.metadata_uuid("paymentId").is_none());
    }

    #[test]
    fn unknown_event_shape_is_a_validation_error() {
        let config = ProcessorConfig {
            secret_key: "sk".to_string(),
            publishable_key: "pk".to_string(),
            webhook_secret: SECRET.to_string(),
            base_url: "https://api.payproc.example".to_string(),
            timeout: Duration::from_secs(5),
            session_ttl: Duration::from_secs(1800),
        };
        let client = ProcessorClient::new(&config).unwrap();
        assert!(client.parse_event(br#"{"id":"evt"}"#).is_err());
        assert!(client.parse_event(b"not json").is_err());
    }
}
