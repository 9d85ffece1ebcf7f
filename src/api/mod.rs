pub mod orders;
pub mod payments;
pub mod providers;
pub mod users;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::db::blockchain_tx_repository::BlockchainTxRepository;
use crate::db::order_repository::OrderRepository;
use crate::db::payment_repository::PaymentRepository;
use crate::db::plan_repository::PlanRepository;
use crate::db::provider_repository::ProviderRepository;
use crate::db::sync_log_repository::SyncLogRepository;
use crate::db::user_repository::UserRepository;
use crate::health::HealthChecker;
use crate::providers::registry::AdapterRegistry;
use crate::services::allocation::AllocationService;
use crate::services::checkout::CheckoutService;
use crate::services::webhook::WebhookService;

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub webhook: Arc<WebhookService>,
    pub allocation: Arc<AllocationService>,
    pub users: Arc<UserRepository>,
    pub orders: Arc<OrderRepository>,
    pub payments: Arc<PaymentRepository>,
    pub plans: Arc<PlanRepository>,
    pub txs: Arc<BlockchainTxRepository>,
    pub providers: Arc<ProviderRepository>,
    pub sync_logs: Arc<SyncLogRepository>,
    pub registry: Arc<AdapterRegistry>,
    pub health: Arc<HealthChecker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payments/checkout", post(payments::start_checkout))
        .route("/payments/webhook", post(payments::handle_webhook))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route("/users/{id}/orders", get(orders::list_user_orders))
        .route(
            "/transactions/{id}/retry",
            post(orders::retry_transaction),
        )
        .route("/users", post(users::create_user))
        .route("/providers", get(providers::list_providers))
        .route("/providers/{slug}/plans", get(providers::list_provider_plans))
        .route("/health", get(providers::health))
        .route("/health/ready", get(providers::readiness))
        .route("/health/live", get(providers::liveness))
        .with_state(state)
}
