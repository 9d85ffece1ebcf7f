//! Periodic confirmation sweep.
//!
//! The correctness backstop for all detached work: advances every live
//! SUBMITTED/CONFIRMING transaction through the poller's transition logic,
//! and re-dispatches paid orders whose allocation was lost (process crash
//! between webhook receipt and scheduling, or an exhausted poller).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::blockchain_tx_repository::BlockchainTxRepository;
use crate::db::order_repository::OrderRepository;
use crate::services::allocation::AllocationService;
use crate::services::confirmation::ConfirmationService;

const SWEEP_TX_BATCH: i64 = 200;
const SWEEP_ORDER_BATCH: i64 = 50;
/// Leave freshly paid orders to the in-process path for a moment before the
/// sweep considers them stalled.
const STALLED_ORDER_GRACE_SECS: i64 = 60;

pub struct ConfirmationSweepWorker {
    txs: Arc<BlockchainTxRepository>,
    orders: Arc<OrderRepository>,
    confirmation: Arc<ConfirmationService>,
    allocation: Arc<AllocationService>,
    interval: Duration,
}

impl ConfirmationSweepWorker {
    pub fn new(
        txs: Arc<BlockchainTxRepository>,
        orders: Arc<OrderRepository>,
        confirmation: Arc<ConfirmationService>,
        allocation: Arc<AllocationService>,
        interval: Duration,
    ) -> Self {
        Self {
            txs,
            orders,
            confirmation,
            allocation,
            interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "confirmation sweep worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "confirmation sweep cycle failed");
                    }
                }
            }
        }

        info!("confirmation sweep worker stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        self.advance_live_transactions().await?;
        self.redispatch_stalled_orders().await?;
        Ok(())
    }

    async fn advance_live_transactions(&self) -> anyhow::Result<()> {
        let live = self.txs.find_for_sweep(SWEEP_TX_BATCH).await?;
        if live.is_empty() {
            return Ok(());
        }
        info!(count = live.len(), "sweeping live blockchain transactions");

        for row in live {
            if let Err(e) = self.confirmation.probe_once(row.id).await {
                warn!(tx_id = %row.id, error = %e, "sweep probe failed");
            }
        }
        Ok(())
    }

    async fn redispatch_stalled_orders(&self) -> anyhow::Result<()> {
        let stalled = self
            .orders
            .find_stalled_payment_completed(STALLED_ORDER_GRACE_SECS, SWEEP_ORDER_BATCH)
            .await?;
        if stalled.is_empty() {
            return Ok(());
        }
        info!(count = stalled.len(), "re-dispatching stalled paid orders");

        for order in stalled {
            if let Err(e) = self.allocation.dispatch(order.id).await {
                warn!(order_id = %order.id, error = %e, "sweep re-dispatch failed");
            }
        }
        Ok(())
    }
}
