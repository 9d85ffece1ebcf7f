//! Payment webhook ingestor.
//!
//! Signature verification is mandatory and its failure is the only error
//! surfaced to the processor; everything after a valid signature is absorbed
//! so at-least-once delivery never triggers retry storms. Idempotency comes
//! from status-guarded row updates, not from remembering event ids.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::db::order_repository::OrderRepository;
use crate::db::payment_repository::{Payment, PaymentRepository};
use crate::db::types::PaymentStatus;
use crate::error::AppResult;
use crate::services::processor::{ProcessorClient, ProcessorEvent};
use crate::services::AllocationScheduler;

pub struct WebhookService {
    pool: PgPool,
    orders: Arc<OrderRepository>,
    payments: Arc<PaymentRepository>,
    processor: Arc<ProcessorClient>,
    scheduler: Arc<dyn AllocationScheduler>,
}

impl WebhookService {
    pub fn new(
        pool: PgPool,
        orders: Arc<OrderRepository>,
        payments: Arc<PaymentRepository>,
        processor: Arc<ProcessorClient>,
        scheduler: Arc<dyn AllocationScheduler>,
    ) -> Self {
        Self {
            pool,
            orders,
            payments,
            processor,
            scheduler,
        }
    }

    /// Entry point for raw webhook bytes. Returns an error only for a bad
    /// signature; post-verification failures are logged and swallowed.
    pub async fn ingest(&self, payload: &[u8], signature_header: &str) -> AppResult<()> {
        self.processor.verify_signature(payload, signature_header)?;

        let event = match self.processor.parse_event(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "signed webhook with unparseable payload, dropping");
                return Ok(());
            }
        };

        if let Err(e) = self.process_event(&event).await {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "webhook processing failed"
            );
        }
        Ok(())
    }

    async fn process_event(&self, event: &ProcessorEvent) -> AppResult<()> {
        match event.event_type.as_str() {
            "checkout.session.completed" => self.on_session_completed(event).await,
            "checkout.session.expired" => self.on_session_expired(event).await,
            "payment_intent.succeeded" => self.on_intent_succeeded(event).await,
            "payment_intent.payment_failed" => self.on_intent_failed(event).await,
            other => {
                info!(event_type = other, "ignoring unhandled webhook event");
                Ok(())
            }
        }
    }

    async fn resolve_payment_by_session(
        &self,
        event: &ProcessorEvent,
    ) -> AppResult<Option<Payment>> {
        if let Some(session_id) = event.object_id() {
            if let Some(payment) = self.payments.find_by_session_id(session_id).await? {
                return Ok(Some(payment));
            }
        }
        // Session id not yet persisted (crash between session creation and
        // the payment update); fall back to the metadata we stamped.
        if let Some(payment_id) = event.metadata_uuid("paymentId") {
            return Ok(self.payments.find_by_id(payment_id).await?);
        }
        Ok(None)
    }

    async fn on_session_completed(&self, event: &ProcessorEvent) -> AppResult<()> {
        let payment = match self.resolve_payment_by_session(event).await? {
            Some(payment) => payment,
            None => {
                warn!(event_id = %event.id, "completed session with no matching payment");
                return Ok(());
            }
        };

        if payment.payment_status() == Some(PaymentStatus::Succeeded) {
            info!(payment_id = %payment.id, "payment already settled, no-op");
            return Ok(());
        }

        let metadata = event.object.get("metadata").cloned();
        let mut tx = self.pool.begin().await.map_err(|e| {
            crate::error::AppError::internal(format!("webhook transaction: {}", e))
        })?;

        let payment_updated = self
            .payments
            .mark_succeeded(
                &mut *tx,
                payment.id,
                event.payment_intent_id(),
                metadata.as_ref(),
            )
            .await?;
        if !payment_updated {
            // Terminal payment (cancelled or failed): a late completion must
            // not resurrect the order.
            info!(payment_id = %payment.id, "payment terminal, ignoring completion");
            return Ok(());
        }

        let order_updated = self.orders.mark_paid(&mut *tx, payment.order_id).await?;
        if !order_updated {
            info!(order_id = %payment.order_id, "order not advanceable, dropping completion");
            tx.rollback().await.ok();
            return Ok(());
        }

        tx.commit().await.map_err(|e| {
            crate::error::AppError::internal(format!("webhook commit: {}", e))
        })?;

        info!(order_id = %payment.order_id, "payment completed, scheduling allocation");
        // Fire-and-forget; the sweep re-dispatches if this is lost.
        self.scheduler.schedule_allocation(payment.order_id).await;
        Ok(())
    }

    async fn on_session_expired(&self, event: &ProcessorEvent) -> AppResult<()> {
        let payment = match self.resolve_payment_by_session(event).await? {
            Some(payment) => payment,
            None => return Ok(()),
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            crate::error::AppError::internal(format!("webhook transaction: {}", e))
        })?;

        let payment_updated = self
            .payments
            .mark_closed(
                &mut *tx,
                payment.id,
                PaymentStatus::Cancelled,
                Some("Payment session expired"),
            )
            .await?;
        if !payment_updated {
            info!(payment_id = %payment.id, "payment terminal, ignoring expiry");
            return Ok(());
        }

        self.orders
            .update_status_guarded(
                &mut *tx,
                payment.order_id,
                &[
                    crate::db::types::OrderStatus::PendingPayment,
                    crate::db::types::OrderStatus::PaymentProcessing,
                ],
                crate::db::types::OrderStatus::Cancelled,
                Some("Payment session expired"),
            )
            .await?;

        tx.commit().await.map_err(|e| {
            crate::error::AppError::internal(format!("webhook commit: {}", e))
        })?;
        info!(order_id = %payment.order_id, "order cancelled after session expiry");
        Ok(())
    }

    async fn on_intent_succeeded(&self, event: &ProcessorEvent) -> AppResult<()> {
        let intent_id = match event.object_id() {
            Some(id) => id,
            None => return Ok(()),
        };
        let payment = match self.payments.find_by_intent_id(intent_id).await? {
            Some(payment) => payment,
            None => return Ok(()),
        };
        if payment.payment_status() == Some(PaymentStatus::Succeeded) {
            return Ok(());
        }
        // Redundant with checkout.session.completed but tolerated.
        self.payments
            .mark_succeeded(self.payments.pool(), payment.id, Some(intent_id), None)
            .await?;
        info!(payment_id = %payment.id, "payment settled via intent event");
        Ok(())
    }

    async fn on_intent_failed(&self, event: &ProcessorEvent) -> AppResult<()> {
        let intent_id = match event.object_id() {
            Some(id) => id,
            None => return Ok(()),
        };
        let payment = match self.payments.find_by_intent_id(intent_id).await? {
            Some(payment) => payment,
            None => return Ok(()),
        };

        let message = event.failure_message().unwrap_or("payment failed");
        let mut tx = self.pool.begin().await.map_err(|e| {
            crate::error::AppError::internal(format!("webhook transaction: {}", e))
        })?;

        let payment_updated = self
            .payments
            .mark_closed(&mut *tx, payment.id, PaymentStatus::Failed, Some(message))
            .await?;
        if !payment_updated {
            return Ok(());
        }

        self.orders
            .update_status_guarded(
                &mut *tx,
                payment.order_id,
                &[
                    crate::db::types::OrderStatus::PendingPayment,
                    crate::db::types::OrderStatus::PaymentProcessing,
                ],
                crate::db::types::OrderStatus::PaymentFailed,
                Some(message),
            )
            .await?;

        tx.commit().await.map_err(|e| {
            crate::error::AppError::internal(format!("webhook commit: {}", e))
        })?;
        info!(order_id = %payment.order_id, "order marked payment-failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::services::processor::ProcessorEvent;

    fn event(event_type: &str) -> ProcessorEvent {
        ProcessorEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            object: serde_json::json!({ "id": "cs_1" }),
        }
    }

    #[test]
    fn handled_event_types_are_the_documented_four() {
        for handled in [
            "checkout.session.completed",
            "checkout.session.expired",
            "payment_intent.succeeded",
            "payment_intent.payment_failed",
        ] {
            assert!(is_handled(&event(handled)));
        }
        assert!(!is_handled(&event("charge.refunded")));
        assert!(!is_handled(&event("customer.created")));
    }

    fn is_handled(event: &ProcessorEvent) -> bool {
        matches!(
            event.event_type.as_str(),
            "checkout.session.completed"
                | "checkout.session.expired"
                | "payment_intent.succeeded"
                | "payment_intent.payment_failed"
        )
    }
}
