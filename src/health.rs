//! Health reporting over the pool and the adapter registry.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;

use crate::providers::registry::AdapterRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub slug: String,
    pub available: bool,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub database: bool,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Clone)]
pub struct HealthChecker {
    pool: PgPool,
    registry: Arc<AdapterRegistry>,
}

impl HealthChecker {
    pub fn new(pool: PgPool, registry: Arc<AdapterRegistry>) -> Self {
        Self { pool, registry }
    }

    pub async fn check(&self) -> HealthStatus {
        let database = crate::db::health_check(&self.pool).await.is_ok();

        let available = self.registry.available().await;
        let available_slugs: Vec<&str> = available.iter().map(|a| a.slug()).collect();

        let providers: Vec<ProviderHealth> = self
            .registry
            .slugs()
            .into_iter()
            .map(|slug| ProviderHealth {
                slug: slug.to_string(),
                available: available_slugs.contains(&slug),
                degraded: self.registry.is_degraded(slug),
            })
            .collect();

        let status = if !database {
            HealthState::Unhealthy
        } else if providers.iter().any(|p| !p.available || p.degraded) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthStatus {
            status,
            database,
            providers,
        }
    }
}
