use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::types::OrderStatus;

const ORDER_COLUMNS: &str = "id, order_number, user_id, provider_id, plan_id, size_gb, \
     size_bytes, duration_days, price_cents, currency, status, status_message, \
     idempotency_key, storage_id, storage_endpoint, storage_metadata, paid_at, \
     allocated_at, expires_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub plan_id: Uuid,
    pub size_gb: i64,
    pub size_bytes: i64,
    pub duration_days: i32,
    pub price_cents: i64,
    pub currency: String,
    pub status: String,
    pub status_message: Option<String>,
    pub idempotency_key: Option<String>,
    pub storage_id: Option<String>,
    pub storage_endpoint: Option<String>,
    pub storage_metadata: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub allocated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn order_status(&self) -> Option<OrderStatus> {
        OrderStatus::from_db(&self.status)
    }
}

/// Plan fields are snapshotted onto the order at creation; later catalog
/// mutations never touch historical orders.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub plan_id: Uuid,
    pub size_gb: i64,
    pub size_bytes: i64,
    pub duration_days: i32,
    pub price_cents: i64,
    pub currency: &'a str,
    pub idempotency_key: Option<&'a str>,
}

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create(
        &self,
        executor: impl PgExecutor<'_>,
        new: &NewOrder<'_>,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders
               (order_number, user_id, provider_id, plan_id, size_gb, size_bytes,
                duration_days, price_cents, currency, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(new.order_number)
        .bind(new.user_id)
        .bind(new.provider_id)
        .bind(new.plan_id)
        .bind(new.size_gb)
        .bind(new.size_bytes)
        .bind(new.duration_days)
        .bind(new.price_cents)
        .bind(new.currency)
        .bind(new.idempotency_key)
        .fetch_one(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Advance the order status only when the row is still in one of the
    /// expected states. Returns false when the guard failed, which callers
    /// treat as "someone else already moved it".
    pub async fn update_status_guarded(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        message: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let from_db: Vec<&'static str> = from.iter().map(|s| s.as_db()).collect();
        let result = sqlx::query(
            "UPDATE orders
             SET status = $2,
                 status_message = COALESCE($3, status_message),
                 updated_at = now()
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id)
        .bind(to.as_db())
        .bind(message)
        .bind(&from_db)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Payment confirmed: stamp `paid_at` together with the status move.
    pub async fn mark_paid(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET status = 'PAYMENT_COMPLETED', paid_at = now(), updated_at = now()
             WHERE id = $1 AND status IN ('PENDING_PAYMENT', 'PAYMENT_PROCESSING')",
        )
        .bind(id)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Storage coordinates become available as soon as submission succeeds,
    /// before network confirmation.
    pub async fn stamp_storage(
        &self,
        id: Uuid,
        storage_id: Option<&str>,
        storage_endpoint: Option<&str>,
        storage_metadata: Option<&serde_json::Value>,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET storage_id = COALESCE($2, storage_id),
                 storage_endpoint = COALESCE($3, storage_endpoint),
                 storage_metadata = COALESCE($4, storage_metadata),
                 updated_at = now()
             WHERE id = $1
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(storage_id)
        .bind(storage_endpoint)
        .bind(storage_metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Terminal completion. `expires_at` is derived from `allocated_at` plus
    /// the snapshotted duration and set exactly once.
    pub async fn complete(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
        allocated_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET status = 'COMPLETED',
                 allocated_at = $2,
                 expires_at = $2 + make_interval(days => duration_days),
                 updated_at = now()
             WHERE id = $1 AND status = 'BLOCKCHAIN_CONFIRMED' AND allocated_at IS NULL",
        )
        .bind(id)
        .bind(allocated_at)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Orders stuck in PAYMENT_COMPLETED with no live blockchain transaction.
    /// These are sweep candidates for allocation re-dispatch (crash between
    /// webhook receipt and orchestrator scheduling).
    pub async fn find_stalled_payment_completed(
        &self,
        older_than_secs: i64,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o
             WHERE o.status = 'PAYMENT_COMPLETED'
               AND o.updated_at < now() - make_interval(secs => $1::float8)
               AND NOT EXISTS (
                   SELECT 1 FROM blockchain_transactions t
                   WHERE t.order_id = o.id AND t.status <> 'FAILED'
               )
             ORDER BY o.updated_at
             LIMIT $2"
        ))
        .bind(older_than_secs as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
