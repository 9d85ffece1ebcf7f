//! Provider listing and health endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::health::HealthState;

/// GET /providers
pub async fn list_providers(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let rows = state.providers.list_enabled().await?;
    let available = state.registry.available().await;
    let available_slugs: Vec<&str> = available.iter().map(|a| a.slug()).collect();

    let mut providers = Vec::with_capacity(rows.len());
    for provider in rows {
        let registered = state.registry.get_opt(&provider.slug).is_some();
        let available = available_slugs.contains(&provider.slug.as_str());
        let last_sync = state
            .sync_logs
            .latest_for_provider(provider.id)
            .await?
            .map(|log| {
                json!({
                    "finishedAt": log.finished_at,
                    "plansAdded": log.plans_added,
                    "plansUpdated": log.plans_updated,
                    "plansDeactivated": log.plans_deactivated,
                })
            });
        providers.push(json!({
            "id": provider.id,
            "slug": provider.slug,
            "name": provider.name,
            "network": provider.network,
            "status": provider.status,
            "registered": registered,
            "available": available,
            "lastSync": last_sync,
        }));
    }

    Ok(Json(json!({ "providers": providers })))
}

/// GET /providers/{slug}/plans
pub async fn list_provider_plans(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let provider = state
        .providers
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("provider"))?;
    let plans = state.plans.list_by_provider(provider.id).await?;
    Ok(Json(json!({ "provider": provider.slug, "plans": plans })))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check().await;
    let code = match status.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(status))
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    health(State(state)).await
}

/// GET /health/live
pub async fn liveness() -> &'static str {
    "OK"
}
