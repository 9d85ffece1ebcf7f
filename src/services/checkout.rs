//! Checkout initiator.
//!
//! Creates the order + payment pair inside one store transaction, then asks
//! the processor for a hosted session. The pair is persisted first so a
//! webhook can never arrive for rows that do not exist yet; a processor
//! failure strands an unreachable PENDING_PAYMENT order that the session
//! expiry path sweeps up.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::order_repository::{NewOrder, Order, OrderRepository};
use crate::db::payment_repository::PaymentRepository;
use crate::db::plan_repository::PlanRepository;
use crate::db::provider_repository::ProviderRepository;
use crate::db::user_repository::UserRepository;
use crate::error::{AppError, AppResult};
use crate::services::processor::{NewCheckoutSession, ProcessorClient};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub success_url: String,
    pub cancel_url: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
}

pub struct CheckoutService {
    pool: PgPool,
    users: Arc<UserRepository>,
    providers: Arc<ProviderRepository>,
    plans: Arc<PlanRepository>,
    orders: Arc<OrderRepository>,
    payments: Arc<PaymentRepository>,
    processor: Arc<ProcessorClient>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        users: Arc<UserRepository>,
        providers: Arc<ProviderRepository>,
        plans: Arc<PlanRepository>,
        orders: Arc<OrderRepository>,
        payments: Arc<PaymentRepository>,
        processor: Arc<ProcessorClient>,
    ) -> Self {
        Self {
            pool,
            users,
            providers,
            plans,
            orders,
            payments,
            processor,
        }
    }

    pub async fn start_checkout(&self, request: CheckoutRequest) -> AppResult<CheckoutOutcome> {
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(order) = self.orders.find_by_idempotency_key(key).await? {
                return self.replay_existing(order).await;
            }
        }

        let user = self
            .users
            .find_by_id(request.user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let plan = self
            .plans
            .find_by_id(request.plan_id)
            .await?
            .ok_or(AppError::PlanNotFound)?;
        if !plan.is_purchasable() {
            return Err(AppError::PlanUnavailable);
        }

        let provider = self
            .providers
            .find_by_id(plan.provider_id)
            .await?
            .ok_or_else(|| AppError::not_found("provider"))?;
        if !provider.is_purchasable() {
            return Err(AppError::PlanUnavailable);
        }

        // Processor-side customer record, created on first purchase and
        // cached on the user row.
        let customer_id = match &user.processor_customer_id {
            Some(id) => id.clone(),
            None => {
                let customer = self.processor.create_customer(&user.email).await?;
                self.users
                    .set_processor_customer_id(user.id, &customer.id)
                    .await?;
                customer.id
            }
        };

        let order_number = generate_order_number();
        let payment_idempotency_key = request
            .idempotency_key
            .as_deref()
            .map(|key| format!("{}:payment", key));

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::internal(format!("failed to open checkout transaction: {}", e))
        })?;

        let created = self
            .orders
            .create(
                &mut *tx,
                &NewOrder {
                    order_number: &order_number,
                    user_id: user.id,
                    provider_id: provider.id,
                    plan_id: plan.id,
                    size_gb: plan.size_gb,
                    size_bytes: plan.size_bytes,
                    duration_days: plan.duration_days,
                    price_cents: plan.price_cents,
                    currency: &plan.currency,
                    idempotency_key: request.idempotency_key.as_deref(),
                },
            )
            .await;

        let order = match created {
            Ok(order) => order,
            Err(e) if e.is_unique_violation() => {
                // Lost a race on the idempotency key; the winner's order is
                // the caller's order.
                drop(tx);
                if let Some(key) = request.idempotency_key.as_deref() {
                    if let Some(order) = self.orders.find_by_idempotency_key(key).await? {
                        return self.replay_existing(order).await;
                    }
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let payment = self
            .payments
            .create(
                &mut *tx,
                order.id,
                user.id,
                plan.price_cents,
                &plan.currency,
                payment_idempotency_key.as_deref(),
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| AppError::internal(format!("checkout commit failed: {}", e)))?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            plan = %plan.external_plan_id,
            "order created"
        );

        // Outside the store transaction: the processor cannot emit a webhook
        // before it answers this call.
        let session = self
            .processor
            .create_checkout_session(&NewCheckoutSession {
                customer_id: &customer_id,
                amount_cents: plan.price_cents,
                currency: &plan.currency,
                success_url: &request.success_url,
                cancel_url: &request.cancel_url,
                order_id: order.id,
                payment_id: payment.id,
                user_id: user.id,
                plan_id: plan.id,
            })
            .await?;

        self.payments.set_session_id(payment.id, &session.id).await?;

        Ok(CheckoutOutcome {
            order_id: order.id,
            payment_id: payment.id,
            session_id: Some(session.id),
            session_url: Some(session.url),
        })
    }

    /// Idempotent replay: an order already bears this key. Re-fetch its
    /// hosted session; when the session is gone or no longer open, hand back
    /// the order without creating anything new.
    async fn replay_existing(&self, order: Order) -> AppResult<CheckoutOutcome> {
        let payment = self
            .payments
            .find_latest_by_order(order.id)
            .await?
            .ok_or_else(|| AppError::internal("order without payment row"))?;

        if let Some(session_id) = payment.processor_session_id.as_deref() {
            match self.processor.retrieve_session(session_id).await {
                Ok(Some(session)) if session.is_open() => {
                    return Ok(CheckoutOutcome {
                        order_id: order.id,
                        payment_id: payment.id,
                        session_id: Some(session.id),
                        session_url: Some(session.url),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "session re-fetch failed");
                }
            }
        }

        Ok(CheckoutOutcome {
            order_id: order.id,
            payment_id: payment.id,
            session_id: None,
            session_url: None,
        })
    }
}

/// Human-readable unique order number, e.g. `ORD-20260802-4F2A9C01D3`.
fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string()[..10].to_uppercase();
    format!("ORD-{}-{}", date, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_have_the_documented_shape() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 10);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn order_numbers_are_unique_across_calls() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert_ne!(a, b);
    }
}
