//! Order read, cancel, and operator retry endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::db::blockchain_tx_repository::BlockchainTransaction;
use crate::db::order_repository::Order;
use crate::db::payment_repository::Payment;
use crate::db::types::{OrderStatus, PaymentStatus};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: BlockchainTransaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain_transaction: Option<TransactionView>,
}

async fn load_order_view(state: &AppState, id: Uuid) -> AppResult<OrderView> {
    let order = state
        .orders
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("order"))?;

    let payment = state.payments.find_latest_by_order(order.id).await?;
    let transaction = state.txs.find_latest_by_order(order.id).await?;

    let transaction = match transaction {
        Some(transaction) => {
            let explorer_url = match (&transaction.tx_hash, state.providers.find_by_id(transaction.provider_id).await?) {
                (Some(hash), Some(provider)) => state
                    .registry
                    .get_opt(&provider.slug)
                    .map(|adapter| adapter.explorer_url(hash)),
                _ => None,
            };
            Some(TransactionView {
                transaction,
                explorer_url,
            })
        }
        None => None,
    };

    Ok(OrderView {
        order,
        payment,
        blockchain_transaction: transaction,
    })
}

/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrderView>> {
    Ok(Json(load_order_view(&state, id).await?))
}

/// POST /orders/{id}/cancel
///
/// Buyer cancellation, legal only from PENDING_PAYMENT. Closes the live
/// payment alongside the order so a late session completion is a no-op.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrderView>> {
    let order = state
        .orders
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("order"))?;

    let status = order
        .order_status()
        .ok_or_else(|| AppError::internal(format!("unknown order status {}", order.status)))?;
    if !status.is_cancellable() {
        return Err(AppError::InvalidOrderStatus {
            expected: OrderStatus::PendingPayment.to_string(),
            found: status.to_string(),
        });
    }

    let mut tx = state
        .orders
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::internal(format!("cancel transaction: {}", e)))?;

    let cancelled = state
        .orders
        .update_status_guarded(
            &mut *tx,
            order.id,
            &[OrderStatus::PendingPayment],
            OrderStatus::Cancelled,
            Some("Cancelled by buyer"),
        )
        .await?;
    if !cancelled {
        return Err(AppError::InvalidOrderStatus {
            expected: OrderStatus::PendingPayment.to_string(),
            found: "concurrent update".to_string(),
        });
    }

    if let Some(payment) = state.payments.find_latest_by_order(order.id).await? {
        state
            .payments
            .mark_closed(
                &mut *tx,
                payment.id,
                PaymentStatus::Cancelled,
                Some("Cancelled by buyer"),
            )
            .await?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::internal(format!("cancel commit: {}", e)))?;

    info!(order_id = %order.id, "order cancelled by buyer");
    Ok(Json(load_order_view(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// GET /users/{id}/orders
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    let orders = state.orders.list_by_user(id, limit, offset).await?;
    Ok(Json(json!({
        "orders": orders,
        "limit": limit,
        "offset": offset,
    })))
}

/// POST /transactions/{id}/retry — operator action, bounded by maxRetries.
pub async fn retry_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let tx_id = state.allocation.retry_transaction(id).await?;
    Ok(Json(json!({ "transactionId": tx_id })))
}
