//! Periodic plan catalog sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::services::plan_sync::PlanSyncService;

pub struct PlanSyncWorker {
    service: Arc<PlanSyncService>,
    interval: Duration,
}

impl PlanSyncWorker {
    pub fn new(service: Arc<PlanSyncService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "plan sync worker started"
        );

        // Seed the catalog immediately; afterwards hold the cadence.
        self.service.sync_all().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.service.sync_all().await;
                }
            }
        }

        info!("plan sync worker stopped");
    }
}
