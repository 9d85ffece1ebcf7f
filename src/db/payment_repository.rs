use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::types::PaymentStatus;

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, amount_cents, currency, \
     processor_payment_intent_id, processor_session_id, status, idempotency_key, \
     last_error, metadata, processed_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub processor_payment_intent_id: Option<String>,
    pub processor_session_id: Option<String>,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub last_error: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_db(&self.status)
    }
}

pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create(
        &self,
        executor: impl PgExecutor<'_>,
        order_id: Uuid,
        user_id: Uuid,
        amount_cents: i64,
        currency: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Payment, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments (order_id, user_id, amount_cents, currency, idempotency_key)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(order_id)
        .bind(user_id)
        .bind(amount_cents)
        .bind(currency)
        .bind(idempotency_key)
        .fetch_one(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_latest_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE order_id = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE processor_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_intent_id(
        &self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE processor_payment_intent_id = $1"
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Persist the hosted-checkout session id after the processor call. The
    /// unique index on processor_session_id backstops duplicate sessions.
    pub async fn set_session_id(
        &self,
        id: Uuid,
        session_id: &str,
    ) -> Result<Payment, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments
             SET processor_session_id = $2, updated_at = now()
             WHERE id = $1
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Settle the payment. Guarded on non-terminal status so webhook
    /// redelivery is a no-op. Returns false when the guard failed.
    pub async fn mark_succeeded(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
        payment_intent_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'SUCCEEDED',
                 processor_payment_intent_id = COALESCE($2, processor_payment_intent_id),
                 metadata = COALESCE($3, metadata),
                 processed_at = now(),
                 updated_at = now()
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .bind(payment_intent_id)
        .bind(metadata)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Move a live payment to FAILED or CANCELLED; no-op once terminal.
    pub async fn mark_closed(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
        status: PaymentStatus,
        last_error: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        debug_assert!(matches!(
            status,
            PaymentStatus::Failed | PaymentStatus::Cancelled
        ));
        let result = sqlx::query(
            "UPDATE payments
             SET status = $2,
                 last_error = COALESCE($3, last_error),
                 updated_at = now()
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .bind(status.as_db())
        .bind(last_error)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }
}
