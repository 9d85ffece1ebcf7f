use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::types::ProviderStatus;

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct Provider {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub network: String,
    pub chain_id: Option<i64>,
    pub status: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn provider_status(&self) -> Option<ProviderStatus> {
        ProviderStatus::from_db(&self.status)
    }

    pub fn is_purchasable(&self) -> bool {
        self.enabled && self.provider_status() == Some(ProviderStatus::Active)
    }
}

pub struct ProviderRepository {
    pool: PgPool,
}

impl ProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        slug: &str,
        name: &str,
        network: &str,
        chain_id: Option<i64>,
    ) -> Result<Provider, DatabaseError> {
        sqlx::query_as::<_, Provider>(
            "INSERT INTO providers (slug, name, network, chain_id)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (slug) DO UPDATE
             SET name = EXCLUDED.name,
                 network = EXCLUDED.network,
                 chain_id = EXCLUDED.chain_id,
                 updated_at = now()
             RETURNING id, slug, name, network, chain_id, status, enabled,
                       created_at, updated_at",
        )
        .bind(slug)
        .bind(name)
        .bind(network)
        .bind(chain_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Provider>, DatabaseError> {
        sqlx::query_as::<_, Provider>(
            "SELECT id, slug, name, network, chain_id, status, enabled,
                    created_at, updated_at
             FROM providers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Provider>, DatabaseError> {
        sqlx::query_as::<_, Provider>(
            "SELECT id, slug, name, network, chain_id, status, enabled,
                    created_at, updated_at
             FROM providers WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn list_enabled(&self) -> Result<Vec<Provider>, DatabaseError> {
        sqlx::query_as::<_, Provider>(
            "SELECT id, slug, name, network, chain_id, status, enabled,
                    created_at, updated_at
             FROM providers WHERE enabled = TRUE
             ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
