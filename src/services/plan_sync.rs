//! Plan catalog reconciliation.
//!
//! For each registered adapter: fetch the remote catalog, add missing plans,
//! update changed ones (bumping the version), and mark plans absent from the
//! remote side UNAVAILABLE. Per-plan errors are collected, never thrown;
//! each provider run lands one row in provider_sync_logs.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::db::plan_repository::{PlanRepository, PlanUpsert, RemotePlanFields};
use crate::db::provider_repository::ProviderRepository;
use crate::db::sync_log_repository::SyncLogRepository;
use crate::error::{AppError, AppResult};
use crate::providers::adapter::StorageAdapter;
use crate::providers::registry::AdapterRegistry;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncOutcome {
    pub added: u32,
    pub updated: u32,
    pub deactivated: u32,
    pub errors: Vec<String>,
}

pub struct PlanSyncService {
    providers: Arc<ProviderRepository>,
    plans: Arc<PlanRepository>,
    sync_logs: Arc<SyncLogRepository>,
    registry: Arc<AdapterRegistry>,
}

impl PlanSyncService {
    pub fn new(
        providers: Arc<ProviderRepository>,
        plans: Arc<PlanRepository>,
        sync_logs: Arc<SyncLogRepository>,
        registry: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            providers,
            plans,
            sync_logs,
            registry,
        }
    }

    /// Reconcile one adapter's catalog into the store.
    pub async fn sync_provider(&self, adapter: &dyn StorageAdapter) -> AppResult<SyncOutcome> {
        let slug = adapter.slug();
        let started_at = Utc::now();

        let provider = self
            .providers
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::not_found("provider"))?;

        let remote = adapter.available_plans().await?;
        let mut outcome = SyncOutcome::default();
        let mut present: Vec<String> = Vec::with_capacity(remote.len());

        for plan in &remote {
            present.push(plan.external_plan_id.clone());
            let fields = RemotePlanFields {
                external_plan_id: &plan.external_plan_id,
                name: &plan.name,
                size_gb: plan.size_gb,
                size_bytes: plan.size_bytes,
                duration_days: plan.duration_days,
                price_cents: plan.price_cents,
                price_native: plan.price_native.clone(),
                currency: &plan.currency,
            };
            match self.plans.upsert_remote(provider.id, &fields).await {
                Ok((_, PlanUpsert::Added)) => outcome.added += 1,
                Ok((_, PlanUpsert::Updated)) => outcome.updated += 1,
                Ok((_, PlanUpsert::Unchanged)) => {}
                Err(e) => {
                    warn!(provider = slug, plan = %plan.external_plan_id, error = %e, "plan upsert failed");
                    outcome
                        .errors
                        .push(format!("{}: {}", plan.external_plan_id, e));
                }
            }
        }

        match self.plans.mark_absent_unavailable(provider.id, &present).await {
            Ok(count) => outcome.deactivated = count.min(u32::MAX as u64) as u32,
            Err(e) => outcome.errors.push(format!("deactivation: {}", e)),
        }

        let errors_json = if outcome.errors.is_empty() {
            None
        } else {
            Some(json!(outcome.errors))
        };
        self.sync_logs
            .record(
                provider.id,
                outcome.added as i32,
                outcome.updated as i32,
                outcome.deactivated as i32,
                errors_json.as_ref(),
                started_at,
            )
            .await?;

        info!(
            provider = slug,
            added = outcome.added,
            updated = outcome.updated,
            deactivated = outcome.deactivated,
            errors = outcome.errors.len(),
            "plan sync finished"
        );
        Ok(outcome)
    }

    /// Fan out across every registered adapter. A failing provider does not
    /// stop the others; no cross-provider ordering is guaranteed.
    pub async fn sync_all(&self) -> Vec<(String, AppResult<SyncOutcome>)> {
        let mut results = Vec::new();
        for adapter in self.registry.all() {
            let slug = adapter.slug().to_string();
            let result = self.sync_provider(adapter.as_ref()).await;
            if let Err(e) = &result {
                warn!(provider = %slug, error = %e, "provider sync failed");
            }
            results.push((slug, result));
        }
        results
    }
}
