use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

use stormesh_backend::api::{self, AppState};
use stormesh_backend::config::AppConfig;
use stormesh_backend::db;
use stormesh_backend::db::blockchain_tx_repository::BlockchainTxRepository;
use stormesh_backend::db::order_repository::OrderRepository;
use stormesh_backend::db::payment_repository::PaymentRepository;
use stormesh_backend::db::plan_repository::PlanRepository;
use stormesh_backend::db::provider_repository::ProviderRepository;
use stormesh_backend::db::sync_log_repository::SyncLogRepository;
use stormesh_backend::db::user_repository::UserRepository;
use stormesh_backend::health::HealthChecker;
use stormesh_backend::logging::init_tracing;
use stormesh_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use stormesh_backend::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use stormesh_backend::providers::filecoin::FilecoinAdapter;
use stormesh_backend::providers::lighthouse::LighthouseAdapter;
use stormesh_backend::providers::registry::AdapterRegistry;
use stormesh_backend::providers::storj::StorjAdapter;
use stormesh_backend::services::allocation::AllocationService;
use stormesh_backend::services::checkout::CheckoutService;
use stormesh_backend::services::confirmation::ConfirmationService;
use stormesh_backend::services::plan_sync::PlanSyncService;
use stormesh_backend::services::processor::ProcessorClient;
use stormesh_backend::services::webhook::WebhookService;
use stormesh_backend::services::AllocationScheduler;
use stormesh_backend::workers::confirmation_sweep::ConfirmationSweepWorker;
use stormesh_backend::workers::plan_sync::PlanSyncWorker;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

fn provider_display_name(slug: &str) -> &str {
    match slug {
        "filecoin" => "Filecoin",
        "storj" => "Storj",
        "lighthouse" => "Lighthouse",
        other => other,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "🚀 starting StorMesh backend"
    );

    // Fails fast on missing processor keys or a short session secret.
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("configuration error: {}", e))?;
    stormesh_backend::error::set_detail_exposure(config.env.is_development());

    info!("📊 initializing database pool");
    let pool = db::init_pool(&config.database).await?;
    sqlx::migrate!().run(&pool).await?;
    info!("✅ database ready");

    let users = Arc::new(UserRepository::new(pool.clone()));
    let provider_repo = Arc::new(ProviderRepository::new(pool.clone()));
    let plans = Arc::new(PlanRepository::new(pool.clone()));
    let orders = Arc::new(OrderRepository::new(pool.clone()));
    let payments = Arc::new(PaymentRepository::new(pool.clone()));
    let txs = Arc::new(BlockchainTxRepository::new(pool.clone()));
    let sync_logs = Arc::new(SyncLogRepository::new(pool.clone()));

    info!("🔌 registering storage adapters");
    let mut registry = AdapterRegistry::new();
    match FilecoinAdapter::new(&config.chains) {
        Ok(adapter) => registry.register(Arc::new(adapter)).await,
        Err(e) => warn!(error = %e, "filecoin adapter not constructed"),
    }
    match StorjAdapter::new(&config.chains.storj) {
        Ok(adapter) => registry.register(Arc::new(adapter)).await,
        Err(e) => warn!(error = %e, "storj adapter not constructed"),
    }
    match LighthouseAdapter::new(&config.chains.lighthouse) {
        Ok(adapter) => registry.register(Arc::new(adapter)).await,
        Err(e) => warn!(error = %e, "lighthouse adapter not constructed"),
    }
    let registry = Arc::new(registry);
    info!(providers = ?registry.slugs(), "✅ adapter registry populated");

    for adapter in registry.all() {
        let slug = adapter.slug();
        if let Err(e) = provider_repo
            .upsert(
                slug,
                provider_display_name(slug),
                adapter.network().as_db(),
                adapter.chain_id(),
            )
            .await
        {
            warn!(provider = slug, error = %e, "provider row upsert failed");
        }
    }

    let processor = Arc::new(
        ProcessorClient::new(&config.processor)
            .map_err(|e| anyhow::anyhow!("processor client: {}", e))?,
    );

    let confirmation = Arc::new(ConfirmationService::new(
        pool.clone(),
        orders.clone(),
        provider_repo.clone(),
        txs.clone(),
        registry.clone(),
        config.workers.poll_interval,
        config.workers.poll_max_attempts,
    ));
    let allocation = Arc::new(AllocationService::new(
        pool.clone(),
        users.clone(),
        provider_repo.clone(),
        plans.clone(),
        orders.clone(),
        txs.clone(),
        registry.clone(),
        confirmation.clone(),
    ));
    let checkout = Arc::new(CheckoutService::new(
        pool.clone(),
        users.clone(),
        provider_repo.clone(),
        plans.clone(),
        orders.clone(),
        payments.clone(),
        processor.clone(),
    ));
    let webhook = Arc::new(WebhookService::new(
        pool.clone(),
        orders.clone(),
        payments.clone(),
        processor.clone(),
        allocation.clone() as Arc<dyn AllocationScheduler>,
    ));
    let plan_sync = Arc::new(PlanSyncService::new(
        provider_repo.clone(),
        plans.clone(),
        sync_logs.clone(),
        registry.clone(),
    ));
    let health = Arc::new(HealthChecker::new(pool.clone(), registry.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweep_worker = ConfirmationSweepWorker::new(
        txs.clone(),
        orders.clone(),
        confirmation.clone(),
        allocation.clone(),
        config.workers.confirmation_sweep_interval,
    );
    let sweep_handle = tokio::spawn(sweep_worker.run(shutdown_rx.clone()));

    let plan_sync_worker =
        PlanSyncWorker::new(plan_sync.clone(), config.workers.plan_sync_interval);
    let plan_sync_handle = tokio::spawn(plan_sync_worker.run(shutdown_rx.clone()));

    let state = AppState {
        checkout,
        webhook,
        allocation,
        users,
        orders,
        payments,
        plans,
        txs,
        providers: provider_repo,
        sync_logs,
        registry,
        health,
    };

    let limiter = RateLimiter::new(config.rate_limit.clone());
    let cors_origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ))
            .layer(cors),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(address = %addr, error = %e, "failed to bind");
        e
    })?;

    info!(address = %addr, "🚀 server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    for (name, handle) in [("sweep", sweep_handle), ("plan sync", plan_sync_handle)] {
        if tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            error!(worker = name, "timed out waiting for worker shutdown");
        }
    }

    info!("👋 shutdown complete");
    Ok(())
}
