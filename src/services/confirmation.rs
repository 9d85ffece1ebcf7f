//! Confirmation polling.
//!
//! A detached poller drives each submitted transaction toward a terminal
//! status: every 10 seconds, up to 30 attempts. Exhaustion is not failure —
//! the periodic sweep applies the exact same transition logic to anything
//! left behind, which also covers process restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::blockchain_tx_repository::{
    BlockchainTransaction, BlockchainTxRepository, StatusProbeRecord,
};
use crate::db::order_repository::OrderRepository;
use crate::db::provider_repository::ProviderRepository;
use crate::db::types::{OrderStatus, TransactionStatus};
use crate::error::{AppError, AppResult};
use crate::providers::adapter::TxStatusProbe;
use crate::providers::registry::AdapterRegistry;

#[derive(Clone)]
pub struct ConfirmationService {
    pool: PgPool,
    orders: Arc<OrderRepository>,
    providers: Arc<ProviderRepository>,
    txs: Arc<BlockchainTxRepository>,
    registry: Arc<AdapterRegistry>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl ConfirmationService {
    pub fn new(
        pool: PgPool,
        orders: Arc<OrderRepository>,
        providers: Arc<ProviderRepository>,
        txs: Arc<BlockchainTxRepository>,
        registry: Arc<AdapterRegistry>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            pool,
            orders,
            providers,
            txs,
            registry,
            poll_interval,
            max_attempts,
        }
    }

    /// Poll until the transaction reaches CONFIRMED or FAILED, or the
    /// attempt budget runs out. Transient probe errors are logged and the
    /// loop continues.
    pub async fn poll_until_terminal(&self, tx_id: Uuid) {
        for attempt in 1..=self.max_attempts {
            match self.probe_once(tx_id).await {
                Ok(true) => {
                    debug!(tx_id = %tx_id, attempt, "transaction settled");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(tx_id = %tx_id, attempt, error = %e, "confirmation probe failed");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        info!(
            tx_id = %tx_id,
            attempts = self.max_attempts,
            "poll budget exhausted, leaving transaction to the sweep"
        );
    }

    /// One probe-and-apply iteration. Returns true when the transaction is
    /// terminal (already or as a result of this probe).
    pub async fn probe_once(&self, tx_id: Uuid) -> AppResult<bool> {
        let row = match self.txs.find_by_id(tx_id).await? {
            Some(row) => row,
            None => return Err(AppError::not_found("blockchain transaction")),
        };

        let status = row
            .transaction_status()
            .ok_or_else(|| AppError::internal(format!("unknown tx status {}", row.status)))?;
        if status.is_terminal() {
            return Ok(true);
        }

        let tx_hash = match row.tx_hash.as_deref() {
            Some(hash) => hash,
            // Submission has not produced a hash yet; nothing to probe.
            None => return Ok(false),
        };

        let provider = self
            .providers
            .find_by_id(row.provider_id)
            .await?
            .ok_or_else(|| AppError::not_found("provider"))?;
        let adapter = self.registry.get(&provider.slug)?;

        let probe = adapter.check_transaction_status(tx_hash).await?;
        self.apply_probe(&row, &probe).await
    }

    /// Persist a probe outcome and, on a terminal status, finish the order
    /// in the same store transaction so observers never see the pair
    /// disagree.
    pub async fn apply_probe(
        &self,
        row: &BlockchainTransaction,
        probe: &TxStatusProbe,
    ) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::internal(format!("confirmation transaction: {}", e)))?;

        let record = StatusProbeRecord {
            status: probe.status,
            confirmations: probe.confirmations.min(i32::MAX as u32) as i32,
            block_number: probe.block_number.map(|n| n as i64),
            block_hash: probe.block_hash.as_deref(),
            gas_used: probe.gas_used.map(|g| g as i64),
            status_message: probe.error.as_deref(),
        };
        let updated = self.txs.apply_status_probe(&mut *tx, row.id, &record).await?;
        if !updated {
            // Already terminal; a concurrent poller or the sweep won.
            return Ok(true);
        }

        match probe.status {
            TransactionStatus::Confirmed => {
                self.orders
                    .update_status_guarded(
                        &mut *tx,
                        row.order_id,
                        &[OrderStatus::BlockchainProcessing],
                        OrderStatus::BlockchainConfirmed,
                        None,
                    )
                    .await?;
                let completed = self.orders.complete(&mut *tx, row.order_id, Utc::now()).await?;
                tx.commit()
                    .await
                    .map_err(|e| AppError::internal(format!("confirmation commit: {}", e)))?;
                if completed {
                    info!(
                        order_id = %row.order_id,
                        tx_id = %row.id,
                        confirmations = probe.confirmations,
                        "order completed"
                    );
                }
                Ok(true)
            }
            TransactionStatus::Failed => {
                let message = probe.error.as_deref().unwrap_or("transaction failed");
                self.orders
                    .update_status_guarded(
                        &mut *tx,
                        row.order_id,
                        &[
                            OrderStatus::BlockchainProcessing,
                            OrderStatus::BlockchainConfirmed,
                        ],
                        OrderStatus::BlockchainFailed,
                        Some(message),
                    )
                    .await?;
                tx.commit()
                    .await
                    .map_err(|e| AppError::internal(format!("confirmation commit: {}", e)))?;
                warn!(order_id = %row.order_id, tx_id = %row.id, message, "transaction failed on network");
                Ok(true)
            }
            _ => {
                tx.commit()
                    .await
                    .map_err(|e| AppError::internal(format!("confirmation commit: {}", e)))?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_budget_matches_five_minutes_at_defaults() {
        let interval = Duration::from_secs(10);
        let attempts = 30u32;
        assert_eq!(interval.as_secs() * attempts as u64, 300);
    }

    #[test]
    fn confirmed_probe_is_terminal_and_failed_probe_is_terminal() {
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Confirming.is_terminal());
        assert!(!TransactionStatus::Submitted.is_terminal());
    }
}
