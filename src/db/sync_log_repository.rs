use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::error::DatabaseError;

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct ProviderSyncLog {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub plans_added: i32,
    pub plans_updated: i32,
    pub plans_deactivated: i32,
    pub errors: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct SyncLogRepository {
    pool: PgPool,
}

impl SyncLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        provider_id: Uuid,
        plans_added: i32,
        plans_updated: i32,
        plans_deactivated: i32,
        errors: Option<&serde_json::Value>,
        started_at: DateTime<Utc>,
    ) -> Result<ProviderSyncLog, DatabaseError> {
        sqlx::query_as::<_, ProviderSyncLog>(
            "INSERT INTO provider_sync_logs
               (provider_id, plans_added, plans_updated, plans_deactivated, errors, started_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, provider_id, plans_added, plans_updated, plans_deactivated,
                       errors, started_at, finished_at",
        )
        .bind(provider_id)
        .bind(plans_added)
        .bind(plans_updated)
        .bind(plans_deactivated)
        .bind(errors)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn latest_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Option<ProviderSyncLog>, DatabaseError> {
        sqlx::query_as::<_, ProviderSyncLog>(
            "SELECT id, provider_id, plans_added, plans_updated, plans_deactivated,
                    errors, started_at, finished_at
             FROM provider_sync_logs
             WHERE provider_id = $1
             ORDER BY finished_at DESC
             LIMIT 1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
