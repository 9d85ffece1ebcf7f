pub mod allocation;
pub mod checkout;
pub mod confirmation;
pub mod plan_sync;
pub mod processor;
pub mod webhook;

use async_trait::async_trait;
use uuid::Uuid;

/// Post-payment dispatch seam.
///
/// The webhook ingestor schedules allocation through this interface and the
/// allocation service implements it, keeping the dependency one-way.
/// Scheduling is fire-and-forget: failures are logged, never propagated back
/// into webhook handling, and the periodic sweep re-dispatches anything that
/// slipped through.
#[async_trait]
pub trait AllocationScheduler: Send + Sync {
    async fn schedule_allocation(&self, order_id: Uuid);
}
