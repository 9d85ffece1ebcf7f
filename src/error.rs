//! Unified error handling.
//!
//! Every service operation returns `Result<T, AppError>`. Errors carry a
//! stable machine-readable code that maps to an HTTP status at the boundary;
//! upstream detail is only exposed in development builds.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Whether error responses may carry upstream detail. Enabled by default
/// for development; production startup turns it off.
static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(true);

pub fn set_detail_exposure(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

fn details_exposed() -> bool {
    EXPOSE_DETAILS.load(Ordering::Relaxed)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("plan is not available for purchase")]
    PlanUnavailable,

    #[error("plan not found")]
    PlanNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid order status: expected {expected}, found {found}")]
    InvalidOrderStatus { expected: String, found: String },

    #[error("payment processor error: {message}")]
    Payment { message: String, retryable: bool },

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("blockchain transaction failed: {message}")]
    TransactionFailed { message: String },

    #[error("retry budget exhausted for transaction {tx_id}")]
    MaxRetries { tx_id: String },

    #[error("provider {slug} error: {message}")]
    Provider {
        slug: String,
        message: String,
        retryable: bool,
    },

    #[error("external service unreachable: {service}")]
    ExternalService { service: String, message: String },

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn provider(slug: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            slug: slug.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Stable machine-readable code, part of the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::PlanUnavailable => "PLAN_UNAVAILABLE",
            AppError::PlanNotFound => "PLAN_NOT_FOUND",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::InvalidOrderStatus { .. } => "INVALID_ORDER_STATUS",
            AppError::Payment { .. } => "PAYMENT_ERROR",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::TransactionFailed { .. } => "TRANSACTION_FAILED",
            AppError::MaxRetries { .. } => "MAX_RETRIES",
            AppError::Provider { .. } => "PROVIDER_ERROR",
            AppError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::PlanUnavailable
            | AppError::PlanNotFound
            | AppError::UserNotFound
            | AppError::InvalidOrderStatus { .. }
            | AppError::InvalidSignature
            | AppError::MaxRetries { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Payment { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::TransactionFailed { .. }
            | AppError::Provider { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Payment { retryable, .. } | AppError::Provider { retryable, .. } => {
                *retryable
            }
            AppError::ExternalService { .. } | AppError::RateLimitExceeded => true,
            _ => false,
        }
    }
}

/// Standardized JSON error envelope returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_error(error: &AppError, request_id: Option<String>) -> Self {
        // Server-side failures carry upstream detail (raw provider and
        // processor messages) only in development configurations.
        let message = if error.status_code().is_server_error() && !details_exposed() {
            "An internal error occurred. Please try again later.".to_string()
        } else {
            error.to_string()
        };
        Self {
            error: error.code().to_string(),
            message,
            timestamp: Utc::now().to_rfc3339(),
            request_id,
            details: None,
            retryable: Some(error.is_retryable()),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        (status, Json(ErrorResponse::from_error(&self, None))).into_response()
    }
}

impl From<crate::db::error::DatabaseError> for AppError {
    fn from(err: crate::db::error::DatabaseError) -> Self {
        use crate::db::error::DatabaseErrorKind;
        match err.kind() {
            DatabaseErrorKind::UniqueViolation { constraint } => AppError::Conflict {
                message: format!("unique constraint violated: {}", constraint),
            },
            DatabaseErrorKind::NotFound => AppError::NotFound {
                entity: "row".to_string(),
            },
            _ => AppError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl From<crate::providers::error::AdapterError> for AppError {
    fn from(err: crate::providers::error::AdapterError) -> Self {
        AppError::Provider {
            slug: err.slug().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            AppError::validation("missing field").code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(AppError::PlanUnavailable.code(), "PLAN_UNAVAILABLE");
        assert_eq!(AppError::InvalidSignature.code(), "INVALID_SIGNATURE");
        assert_eq!(
            AppError::MaxRetries {
                tx_id: "t1".to_string()
            }
            .code(),
            "MAX_RETRIES"
        );
    }

    #[test]
    fn http_status_mapping_matches_contract() {
        assert_eq!(
            AppError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("order").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Payment {
                message: "declined".to_string(),
                retryable: false
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::ExternalService {
                service: "rpc".to_string(),
                message: "down".to_string()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn provider_errors_carry_attribution() {
        let err = AppError::provider("filecoin", "rpc timeout", true);
        assert!(err.to_string().contains("filecoin"));
        assert!(err.is_retryable());
    }

    #[test]
    fn envelope_serializes_code_and_retryable() {
        let response = ErrorResponse::from_error(&AppError::RateLimitExceeded, None);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(value["retryable"], true);
    }
}
