//! Allocation orchestrator.
//!
//! Carries a paid order through provider submission: BLOCKCHAIN_PENDING →
//! BLOCKCHAIN_PROCESSING → (poller) BLOCKCHAIN_CONFIRMED → COMPLETED, or
//! BLOCKCHAIN_FAILED. An existing non-FAILED transaction row short-circuits
//! the whole operation, which is what makes redelivered webhooks harmless.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::blockchain_tx_repository::{BlockchainTxRepository, SubmissionRecord};
use crate::db::order_repository::{Order, OrderRepository};
use crate::db::plan_repository::PlanRepository;
use crate::db::provider_repository::{Provider, ProviderRepository};
use crate::db::types::OrderStatus;
use crate::db::user_repository::UserRepository;
use crate::error::{AppError, AppResult};
use crate::providers::adapter::AllocationParams;
use crate::providers::registry::AdapterRegistry;
use crate::services::confirmation::ConfirmationService;
use crate::services::AllocationScheduler;

#[derive(Clone)]
pub struct AllocationService {
    pool: PgPool,
    users: Arc<UserRepository>,
    providers: Arc<ProviderRepository>,
    plans: Arc<PlanRepository>,
    orders: Arc<OrderRepository>,
    txs: Arc<BlockchainTxRepository>,
    registry: Arc<AdapterRegistry>,
    confirmation: Arc<ConfirmationService>,
}

impl AllocationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        users: Arc<UserRepository>,
        providers: Arc<ProviderRepository>,
        plans: Arc<PlanRepository>,
        orders: Arc<OrderRepository>,
        txs: Arc<BlockchainTxRepository>,
        registry: Arc<AdapterRegistry>,
        confirmation: Arc<ConfirmationService>,
    ) -> Self {
        Self {
            pool,
            users,
            providers,
            plans,
            orders,
            txs,
            registry,
            confirmation,
        }
    }

    /// Dispatch a paid order to its provider. Returns the blockchain
    /// transaction id, existing or fresh.
    pub async fn dispatch(&self, order_id: Uuid) -> AppResult<Uuid> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order"))?;

        // Idempotency seam: a live transaction means this order is already
        // being (or has been) allocated.
        if let Some(existing) = self.txs.find_live_by_order(order_id).await? {
            info!(order_id = %order_id, tx_id = %existing.id, "allocation already in flight");
            return Ok(existing.id);
        }

        let status = order
            .order_status()
            .ok_or_else(|| AppError::internal(format!("unknown order status {}", order.status)))?;
        if status != OrderStatus::PaymentCompleted {
            return Err(AppError::InvalidOrderStatus {
                expected: OrderStatus::PaymentCompleted.to_string(),
                found: status.to_string(),
            });
        }

        let provider = self
            .providers
            .find_by_id(order.provider_id)
            .await?
            .ok_or_else(|| AppError::not_found("provider"))?;

        let advanced = self
            .orders
            .update_status_guarded(
                self.orders.pool(),
                order_id,
                &[OrderStatus::PaymentCompleted],
                OrderStatus::BlockchainPending,
                None,
            )
            .await?;
        if !advanced {
            // Raced another dispatcher; let its transaction row answer.
            if let Some(existing) = self.txs.find_live_by_order(order_id).await? {
                return Ok(existing.id);
            }
            return Err(AppError::conflict("order is being processed concurrently"));
        }

        let tx_row = match self
            .txs
            .create_pending(order_id, provider.id, &provider.network, provider.chain_id)
            .await
        {
            Ok(row) => row,
            Err(e) if e.is_unique_violation() => {
                // The partial unique index caught a concurrent submission.
                if let Some(existing) = self.txs.find_live_by_order(order_id).await? {
                    return Ok(existing.id);
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        self.submit(&order, &provider, tx_row.id).await
    }

    /// Operator retry of a FAILED transaction. Re-enters submission on the
    /// same order, bounded by the per-row retry budget.
    pub async fn retry_transaction(&self, tx_id: Uuid) -> AppResult<Uuid> {
        let row = self
            .txs
            .find_by_id(tx_id)
            .await?
            .ok_or_else(|| AppError::not_found("blockchain transaction"))?;

        let claimed = match self.txs.claim_retry(tx_id).await? {
            Some(claimed) => claimed,
            None => {
                if row.retry_count >= row.max_retries {
                    return Err(AppError::MaxRetries {
                        tx_id: tx_id.to_string(),
                    });
                }
                return Err(AppError::InvalidOrderStatus {
                    expected: "FAILED".to_string(),
                    found: row.status.clone(),
                });
            }
        };

        let order = self
            .orders
            .find_by_id(claimed.order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order"))?;
        let provider = self
            .providers
            .find_by_id(claimed.provider_id)
            .await?
            .ok_or_else(|| AppError::not_found("provider"))?;

        self.orders
            .update_status_guarded(
                self.orders.pool(),
                order.id,
                &[OrderStatus::BlockchainFailed],
                OrderStatus::BlockchainPending,
                Some("operator retry"),
            )
            .await?;

        info!(
            tx_id = %tx_id,
            order_id = %order.id,
            retry_count = claimed.retry_count,
            "retrying blockchain transaction"
        );
        self.submit(&order, &provider, claimed.id).await
    }

    /// Resolve the adapter, submit, and record the outcome. On success the
    /// storage coordinates land on the order immediately and a detached
    /// poller takes over; on failure transaction and order fail together.
    async fn submit(&self, order: &Order, provider: &Provider, tx_id: Uuid) -> AppResult<Uuid> {
        let advanced = self
            .orders
            .update_status_guarded(
                self.orders.pool(),
                order.id,
                &[OrderStatus::BlockchainPending],
                OrderStatus::BlockchainProcessing,
                None,
            )
            .await?;
        if !advanced {
            // The order moved under us; release the transaction row so a
            // later dispatch can start clean.
            self.txs
                .mark_failed(
                    &self.pool,
                    tx_id,
                    "dispatch aborted: order state changed concurrently",
                )
                .await?;
            return Err(AppError::conflict("order state changed during dispatch"));
        }

        let result = self.run_adapter(order, provider).await;

        match result {
            Ok(allocation) => {
                self.txs
                    .record_submission(
                        tx_id,
                        &SubmissionRecord {
                            tx_hash: &allocation.tx_hash,
                            status: allocation.status,
                            from_address: allocation.from_address.as_deref(),
                            to_address: allocation.to_address.as_deref(),
                            raw_response: allocation.raw_response.as_ref(),
                        },
                    )
                    .await?;
                self.orders
                    .stamp_storage(
                        order.id,
                        allocation.storage_id.as_deref(),
                        allocation.storage_endpoint.as_deref(),
                        allocation.storage_metadata.as_ref(),
                    )
                    .await?;

                info!(
                    order_id = %order.id,
                    tx_id = %tx_id,
                    tx_hash = %allocation.tx_hash,
                    provider = %provider.slug,
                    "allocation submitted"
                );

                let confirmation = self.confirmation.clone();
                tokio::spawn(async move {
                    confirmation.poll_until_terminal(tx_id).await;
                });

                Ok(tx_id)
            }
            Err(e) => {
                let message = e.to_string();
                let mut tx = self.pool.begin().await.map_err(|err| {
                    AppError::internal(format!("failure transaction: {}", err))
                })?;
                self.txs.mark_failed(&mut *tx, tx_id, &message).await?;
                self.orders
                    .update_status_guarded(
                        &mut *tx,
                        order.id,
                        &[
                            OrderStatus::BlockchainProcessing,
                            OrderStatus::BlockchainPending,
                        ],
                        OrderStatus::BlockchainFailed,
                        Some(&message),
                    )
                    .await?;
                tx.commit().await.map_err(|err| {
                    AppError::internal(format!("failure commit: {}", err))
                })?;

                warn!(
                    order_id = %order.id,
                    tx_id = %tx_id,
                    provider = %provider.slug,
                    error = %message,
                    "allocation submission failed"
                );
                Err(e)
            }
        }
    }

    async fn run_adapter(
        &self,
        order: &Order,
        provider: &Provider,
    ) -> AppResult<crate::providers::adapter::AllocationResult> {
        let adapter = self.registry.get(&provider.slug)?;

        let plan = self
            .plans
            .find_by_id(order.plan_id)
            .await?
            .ok_or_else(|| AppError::not_found("plan"))?;
        let user = self
            .users
            .find_by_id(order.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        let params = AllocationParams {
            order_id: order.id,
            plan_external_id: plan.external_plan_id.clone(),
            size_bytes: order.size_bytes.max(0) as u64,
            duration_days: order.duration_days.max(0) as u32,
            user_wallet: user.wallet_address.clone(),
        };

        Ok(adapter.execute_storage_transaction(&params).await?)
    }
}

#[async_trait]
impl AllocationScheduler for AllocationService {
    async fn schedule_allocation(&self, order_id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.dispatch(order_id).await {
                error!(order_id = %order_id, error = %e, "scheduled allocation failed");
            }
        });
    }
}
