use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::types::PlanStatus;

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct StoragePlan {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub external_plan_id: String,
    pub name: String,
    pub size_gb: i64,
    pub size_bytes: i64,
    pub duration_days: i32,
    pub price_cents: i64,
    pub price_native: Option<BigDecimal>,
    pub currency: String,
    pub status: String,
    pub active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoragePlan {
    pub fn plan_status(&self) -> Option<PlanStatus> {
        PlanStatus::from_db(&self.status)
    }

    pub fn is_purchasable(&self) -> bool {
        self.active && self.plan_status() == Some(PlanStatus::Available)
    }
}

/// Fields an adapter reports for a remote plan during sync.
#[derive(Debug, Clone)]
pub struct RemotePlanFields<'a> {
    pub external_plan_id: &'a str,
    pub name: &'a str,
    pub size_gb: i64,
    pub size_bytes: i64,
    pub duration_days: i32,
    pub price_cents: i64,
    pub price_native: Option<BigDecimal>,
    pub currency: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanUpsert {
    Added,
    Updated,
    Unchanged,
}

pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<StoragePlan>, DatabaseError> {
        sqlx::query_as::<_, StoragePlan>(
            "SELECT id, provider_id, external_plan_id, name, size_gb, size_bytes,
                    duration_days, price_cents, price_native, currency, status,
                    active, version, created_at, updated_at
             FROM storage_plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn list_by_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<StoragePlan>, DatabaseError> {
        sqlx::query_as::<_, StoragePlan>(
            "SELECT id, provider_id, external_plan_id, name, size_gb, size_bytes,
                    duration_days, price_cents, price_native, currency, status,
                    active, version, created_at, updated_at
             FROM storage_plans WHERE provider_id = $1
             ORDER BY price_cents",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Insert a plan reported by the provider or update a changed one.
    /// Updates bump the monotonic version only when a priced field actually
    /// changed, so repeated syncs are no-ops.
    pub async fn upsert_remote(
        &self,
        provider_id: Uuid,
        fields: &RemotePlanFields<'_>,
    ) -> Result<(StoragePlan, PlanUpsert), DatabaseError> {
        let existing = sqlx::query_as::<_, StoragePlan>(
            "SELECT id, provider_id, external_plan_id, name, size_gb, size_bytes,
                    duration_days, price_cents, price_native, currency, status,
                    active, version, created_at, updated_at
             FROM storage_plans
             WHERE provider_id = $1 AND external_plan_id = $2",
        )
        .bind(provider_id)
        .bind(fields.external_plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match existing {
            None => {
                let plan = sqlx::query_as::<_, StoragePlan>(
                    "INSERT INTO storage_plans
                       (provider_id, external_plan_id, name, size_gb, size_bytes,
                        duration_days, price_cents, price_native, currency)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                     RETURNING id, provider_id, external_plan_id, name, size_gb,
                               size_bytes, duration_days, price_cents, price_native,
                               currency, status, active, version, created_at, updated_at",
                )
                .bind(provider_id)
                .bind(fields.external_plan_id)
                .bind(fields.name)
                .bind(fields.size_gb)
                .bind(fields.size_bytes)
                .bind(fields.duration_days)
                .bind(fields.price_cents)
                .bind(fields.price_native.clone())
                .bind(fields.currency)
                .fetch_one(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
                Ok((plan, PlanUpsert::Added))
            }
            Some(current) => {
                let unchanged = current.name == fields.name
                    && current.size_gb == fields.size_gb
                    && current.size_bytes == fields.size_bytes
                    && current.duration_days == fields.duration_days
                    && current.price_cents == fields.price_cents
                    && current.currency == fields.currency
                    && current.status == PlanStatus::Available.as_db();
                if unchanged {
                    return Ok((current, PlanUpsert::Unchanged));
                }

                let plan = sqlx::query_as::<_, StoragePlan>(
                    "UPDATE storage_plans
                     SET name = $3, size_gb = $4, size_bytes = $5, duration_days = $6,
                         price_cents = $7, price_native = $8, currency = $9,
                         status = 'AVAILABLE', version = version + 1, updated_at = now()
                     WHERE provider_id = $1 AND external_plan_id = $2
                     RETURNING id, provider_id, external_plan_id, name, size_gb,
                               size_bytes, duration_days, price_cents, price_native,
                               currency, status, active, version, created_at, updated_at",
                )
                .bind(provider_id)
                .bind(fields.external_plan_id)
                .bind(fields.name)
                .bind(fields.size_gb)
                .bind(fields.size_bytes)
                .bind(fields.duration_days)
                .bind(fields.price_cents)
                .bind(fields.price_native.clone())
                .bind(fields.currency)
                .fetch_one(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
                Ok((plan, PlanUpsert::Updated))
            }
        }
    }

    /// Mark provider plans absent from the latest remote catalog as
    /// UNAVAILABLE. Returns the number of plans deactivated.
    pub async fn mark_absent_unavailable(
        &self,
        provider_id: Uuid,
        present_external_ids: &[String],
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE storage_plans
             SET status = 'UNAVAILABLE', version = version + 1, updated_at = now()
             WHERE provider_id = $1
               AND status = 'AVAILABLE'
               AND NOT (external_plan_id = ANY($2))",
        )
        .bind(provider_id)
        .bind(present_external_ids)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}
