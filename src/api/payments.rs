//! Checkout and webhook endpoints.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppError;
use crate::services::checkout::CheckoutRequest;

pub const SIGNATURE_HEADER: &str = "processor-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCheckoutBody {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// POST /payments/checkout
pub async fn start_checkout(
    State(state): State<AppState>,
    Json(body): Json<StartCheckoutBody>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(key) = body.idempotency_key.as_deref() {
        if key.trim().is_empty() {
            return Err(AppError::validation("idempotencyKey cannot be empty"));
        }
    }

    let outcome = state
        .checkout
        .start_checkout(CheckoutRequest {
            user_id: body.user_id,
            plan_id: body.plan_id,
            success_url: body
                .success_url
                .unwrap_or_else(|| "https://app.stormesh.example/checkout/success".to_string()),
            cancel_url: body
                .cancel_url
                .unwrap_or_else(|| "https://app.stormesh.example/checkout/cancel".to_string()),
            idempotency_key: body.idempotency_key,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /payments/webhook
///
/// Raw body plus signature header. Only signature failures get a 4xx; the
/// processor's at-least-once delivery is absorbed by idempotent handlers and
/// acknowledged regardless of internal outcome.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.webhook.ingest(body.as_bytes(), signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(e @ AppError::InvalidSignature) => {
            warn!("webhook rejected: invalid signature");
            e.into_response()
        }
        Err(e) => {
            // Post-signature failures are already logged inside the service;
            // acknowledge so the processor stops retrying.
            warn!(error = %e, "webhook acknowledged despite internal error");
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
    }
}
