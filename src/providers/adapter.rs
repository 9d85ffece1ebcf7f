//! The provider capability set.
//!
//! Every storage backend is driven through this trait. Adapters must be
//! side-effect idempotent with respect to `AllocationParams::order_id`:
//! repeating a call with the same order id must not create a second
//! allocation, either through deterministic naming or a caller-side guard.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::types::{NetworkType, TransactionStatus};
use crate::providers::error::AdapterResult;

/// A plan as reported by the backend, before reconciliation into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlan {
    pub external_plan_id: String,
    pub name: String,
    pub size_gb: i64,
    pub size_bytes: i64,
    pub duration_days: i32,
    pub price_cents: i64,
    pub price_native: Option<BigDecimal>,
    pub currency: String,
}

/// Inputs to the allocation action.
#[derive(Debug, Clone)]
pub struct AllocationParams {
    pub order_id: Uuid,
    pub plan_external_id: String,
    pub size_bytes: u64,
    pub duration_days: u32,
    pub user_wallet: Option<String>,
}

/// Outcome of a successful submission. The transaction is not yet confirmed;
/// `tx_hash` may be a content address for API-backed adapters.
#[derive(Debug, Clone)]
pub struct AllocationResult {
    pub tx_hash: String,
    pub status: TransactionStatus,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub storage_id: Option<String>,
    pub storage_endpoint: Option<String>,
    pub storage_metadata: Option<JsonValue>,
    pub raw_response: Option<JsonValue>,
}

/// Current network view of a submitted transaction.
#[derive(Debug, Clone)]
pub struct TxStatusProbe {
    pub status: TransactionStatus,
    pub confirmations: u32,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub error: Option<String>,
}

impl TxStatusProbe {
    pub fn still_pending(status: TransactionStatus) -> Self {
        Self {
            status,
            confirmations: 0,
            block_number: None,
            block_hash: None,
            gas_used: None,
            error: None,
        }
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Stable registry key.
    fn slug(&self) -> &'static str;

    fn network(&self) -> NetworkType;

    fn chain_id(&self) -> Option<i64> {
        None
    }

    /// Prepare transport. Failure is non-fatal: the registry keeps the
    /// adapter flagged degraded so other providers still work.
    async fn initialize(&self) -> AdapterResult<()>;

    /// Cheap liveness probe; must answer within a few seconds or report
    /// false.
    async fn is_available(&self) -> bool;

    /// The backend's plan catalog. Off the critical purchase path.
    async fn available_plans(&self) -> AdapterResult<Vec<RemotePlan>>;

    /// Submit the allocation for an order.
    async fn execute_storage_transaction(
        &self,
        params: &AllocationParams,
    ) -> AdapterResult<AllocationResult>;

    /// Probe the network status of a previously submitted transaction.
    async fn check_transaction_status(&self, tx_hash: &str) -> AdapterResult<TxStatusProbe>;

    /// Pure formatter for the public explorer link.
    fn explorer_url(&self, tx_hash: &str) -> String;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory adapter used across service tests.
    pub struct MockAdapter {
        pub slug: &'static str,
        pub available: bool,
        pub plans: Vec<RemotePlan>,
        pub submit_error: Option<String>,
        pub probe_status: Mutex<TransactionStatus>,
        pub probe_confirmations: AtomicU32,
        pub submissions: Mutex<Vec<Uuid>>,
    }

    impl MockAdapter {
        pub fn new(slug: &'static str) -> Self {
            Self {
                slug,
                available: true,
                plans: Vec::new(),
                submit_error: None,
                probe_status: Mutex::new(TransactionStatus::Confirmed),
                probe_confirmations: AtomicU32::new(6),
                submissions: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(slug: &'static str, error: &str) -> Self {
            let mut adapter = Self::new(slug);
            adapter.submit_error = Some(error.to_string());
            adapter
        }
    }

    #[async_trait]
    impl StorageAdapter for MockAdapter {
        fn slug(&self) -> &'static str {
            self.slug
        }

        fn network(&self) -> NetworkType {
            NetworkType::Testnet
        }

        async fn initialize(&self) -> AdapterResult<()> {
            Ok(())
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn available_plans(&self) -> AdapterResult<Vec<RemotePlan>> {
            Ok(self.plans.clone())
        }

        async fn execute_storage_transaction(
            &self,
            params: &AllocationParams,
        ) -> AdapterResult<AllocationResult> {
            if let Some(error) = &self.submit_error {
                return Err(crate::providers::error::AdapterError::submission(
                    self.slug, error,
                ));
            }
            self.submissions.lock().unwrap().push(params.order_id);
            Ok(AllocationResult {
                tx_hash: format!("0xmock{}", params.order_id.simple()),
                status: TransactionStatus::Submitted,
                from_address: Some("0xplatform".to_string()),
                to_address: Some("0xmarket".to_string()),
                storage_id: Some(format!("store-{}", params.order_id.simple())),
                storage_endpoint: Some("https://mock.storage/endpoint".to_string()),
                storage_metadata: None,
                raw_response: None,
            })
        }

        async fn check_transaction_status(&self, _tx_hash: &str) -> AdapterResult<TxStatusProbe> {
            Ok(TxStatusProbe {
                status: *self.probe_status.lock().unwrap(),
                confirmations: self.probe_confirmations.load(Ordering::SeqCst),
                block_number: Some(100),
                block_hash: Some("0xblock".to_string()),
                gas_used: Some(21_000),
                error: None,
            })
        }

        fn explorer_url(&self, tx_hash: &str) -> String {
            format!("https://explorer.mock/tx/{}", tx_hash)
        }
    }

    #[tokio::test]
    async fn mock_adapter_records_submissions() {
        let adapter = MockAdapter::new("mock");
        let params = AllocationParams {
            order_id: Uuid::new_v4(),
            plan_external_id: "plan-1".to_string(),
            size_bytes: 1 << 30,
            duration_days: 180,
            user_wallet: None,
        };
        let result = adapter.execute_storage_transaction(&params).await.unwrap();
        assert_eq!(result.status, TransactionStatus::Submitted);
        assert_eq!(adapter.submissions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_adapter_surfaces_submission_error() {
        let adapter = MockAdapter::failing("mock", "out of funds");
        let params = AllocationParams {
            order_id: Uuid::new_v4(),
            plan_external_id: "plan-1".to_string(),
            size_bytes: 1 << 30,
            duration_days: 180,
            user_wallet: None,
        };
        let err = adapter
            .execute_storage_transaction(&params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out of funds"));
    }
}
