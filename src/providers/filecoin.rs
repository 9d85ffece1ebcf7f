//! Filecoin adapter (FEVM, blockchain-backed).
//!
//! Allocation reserves a deal through the platform storage-market contract.
//! Without a hot wallet the adapter only submits when mock submissions are
//! explicitly allowed; the fallback is never silent.

use alloy::primitives::Address;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use tracing::info;

use crate::config::{ChainConfig, EvmProviderConfig};
use crate::db::types::{NetworkType, TransactionStatus};
use crate::providers::adapter::{
    AllocationParams, AllocationResult, RemotePlan, StorageAdapter, TxStatusProbe,
};
use crate::providers::error::{AdapterError, AdapterResult};
use crate::providers::evm::FevmClient;

pub const SLUG: &str = "filecoin";

pub struct FilecoinAdapter {
    client: FevmClient,
    explorer_url: String,
    network: NetworkType,
    mock_allowed: bool,
}

impl FilecoinAdapter {
    pub fn new(chains: &ChainConfig) -> AdapterResult<Self> {
        let config: &EvmProviderConfig = &chains.filecoin;
        let client = FevmClient::new(
            SLUG,
            config.rpc_url.clone(),
            config.chain_id,
            chains.platform_wallet_key.as_deref(),
            config.market_address.as_deref(),
        )?;
        let network = if config.chain_id == 314 {
            NetworkType::Mainnet
        } else {
            NetworkType::Testnet
        };
        Ok(Self {
            client,
            explorer_url: config.explorer_url.trim_end_matches('/').to_string(),
            network,
            mock_allowed: chains.allow_mock_submission,
        })
    }

    fn mock_mode(&self) -> bool {
        !self.client.has_wallet() && self.mock_allowed
    }
}

#[async_trait]
impl StorageAdapter for FilecoinAdapter {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn network(&self) -> NetworkType {
        self.network
    }

    fn chain_id(&self) -> Option<i64> {
        Some(self.client.chain_id() as i64)
    }

    async fn initialize(&self) -> AdapterResult<()> {
        if !self.client.has_wallet() && !self.mock_allowed {
            return Err(AdapterError::configuration(
                SLUG,
                "no hot wallet configured and mock submission is not allowed",
            ));
        }
        self.client.check_chain().await
    }

    async fn is_available(&self) -> bool {
        self.client.block_number().await.is_ok()
    }

    async fn available_plans(&self) -> AdapterResult<Vec<RemotePlan>> {
        // Deal templates offered through the platform market contract.
        Ok(vec![
            RemotePlan {
                external_plan_id: "fil-starter-1gb".to_string(),
                name: "Filecoin Starter 1 GB".to_string(),
                size_gb: 1,
                size_bytes: 1 << 30,
                duration_days: 180,
                price_cents: 99,
                price_native: Some(BigDecimal::from(2) / BigDecimal::from(10)),
                currency: "USD".to_string(),
            },
            RemotePlan {
                external_plan_id: "fil-archive-100gb".to_string(),
                name: "Filecoin Archive 100 GB".to_string(),
                size_gb: 100,
                size_bytes: 100 * (1i64 << 30),
                duration_days: 365,
                price_cents: 4_900,
                price_native: Some(BigDecimal::from(11)),
                currency: "USD".to_string(),
            },
        ])
    }

    async fn execute_storage_transaction(
        &self,
        params: &AllocationParams,
    ) -> AdapterResult<AllocationResult> {
        let order_ref = FevmClient::order_ref(params.order_id);

        if self.mock_mode() {
            let tx_hash = FevmClient::mock_tx_hash(SLUG, params.order_id);
            info!(order_id = %params.order_id, tx_hash = %tx_hash, "mock filecoin submission");
            return Ok(AllocationResult {
                tx_hash,
                status: TransactionStatus::Submitted,
                from_address: None,
                to_address: None,
                storage_id: Some(format!("{}", order_ref)),
                storage_endpoint: None,
                storage_metadata: Some(json!({ "mock": true })),
                raw_response: None,
            });
        }

        let beneficiary = match params.user_wallet.as_deref() {
            Some(wallet) => Some(wallet.parse::<Address>().map_err(|e| {
                AdapterError::submission(SLUG, format!("invalid beneficiary address: {}", e))
            })?),
            None => None,
        };

        let submitted = self
            .client
            .submit_reservation(
                params.order_id,
                params.size_bytes,
                params.duration_days,
                beneficiary,
            )
            .await?;

        info!(
            order_id = %params.order_id,
            tx_hash = %submitted.tx_hash,
            "filecoin reservation submitted"
        );

        Ok(AllocationResult {
            tx_hash: submitted.tx_hash,
            status: TransactionStatus::Submitted,
            from_address: Some(submitted.from_address),
            to_address: Some(submitted.to_address.clone()),
            storage_id: Some(format!("{}", order_ref)),
            storage_endpoint: None,
            storage_metadata: Some(json!({
                "market": submitted.to_address,
                "plan": params.plan_external_id,
            })),
            raw_response: Some(submitted.raw_response),
        })
    }

    async fn check_transaction_status(&self, tx_hash: &str) -> AdapterResult<TxStatusProbe> {
        if self.mock_mode() {
            // Mock hashes never reach a node; report them settled so
            // development flows terminate.
            return Ok(TxStatusProbe {
                status: TransactionStatus::Confirmed,
                confirmations: 6,
                block_number: None,
                block_hash: None,
                gas_used: None,
                error: None,
            });
        }
        self.client.probe(tx_hash).await
    }

    fn explorer_url(&self, tx_hash: &str) -> String {
        format!("{}/message/{}", self.explorer_url, tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiProviderConfig;
    use std::time::Duration;

    fn chains(allow_mock: bool) -> ChainConfig {
        ChainConfig {
            platform_wallet_key: None,
            allow_mock_submission: allow_mock,
            filecoin: EvmProviderConfig {
                rpc_url: "https://api.node.glif.io/rpc/v1".to_string(),
                explorer_url: "https://filfox.info/en/".to_string(),
                market_address: None,
                chain_id: 314,
                timeout: Duration::from_secs(30),
            },
            storj: ApiProviderConfig {
                api_url: "https://api.storj.example".to_string(),
                gateway_url: "https://gateway.storjshare.io".to_string(),
                api_key: None,
                timeout: Duration::from_secs(15),
            },
            lighthouse: ApiProviderConfig {
                api_url: "https://node.lighthouse.storage".to_string(),
                gateway_url: "https://gateway.lighthouse.storage".to_string(),
                api_key: None,
                timeout: Duration::from_secs(15),
            },
        }
    }

    #[test]
    fn explorer_url_uses_message_path() {
        let adapter = FilecoinAdapter::new(&chains(true)).unwrap();
        assert_eq!(
            adapter.explorer_url("0xdead"),
            "https://filfox.info/en/message/0xdead"
        );
    }

    #[tokio::test]
    async fn initialize_rejects_missing_wallet_without_mock_toggle() {
        let adapter = FilecoinAdapter::new(&chains(false)).unwrap();
        assert!(adapter.initialize().await.is_err());
    }

    #[tokio::test]
    async fn mock_submission_is_deterministic() {
        let adapter = FilecoinAdapter::new(&chains(true)).unwrap();
        let params = AllocationParams {
            order_id: uuid::Uuid::parse_str("5b2f7c3a-8a44-4d7e-9a59-111213141516").unwrap(),
            plan_external_id: "fil-starter-1gb".to_string(),
            size_bytes: 1 << 30,
            duration_days: 180,
            user_wallet: None,
        };
        let first = adapter.execute_storage_transaction(&params).await.unwrap();
        let second = adapter.execute_storage_transaction(&params).await.unwrap();
        assert_eq!(first.tx_hash, second.tx_hash);
        assert_eq!(first.status, TransactionStatus::Submitted);
        assert_eq!(first.storage_metadata.unwrap()["mock"], true);
    }

    #[tokio::test]
    async fn catalog_contains_starter_plan() {
        let adapter = FilecoinAdapter::new(&chains(true)).unwrap();
        let plans = adapter.available_plans().await.unwrap();
        let starter = plans
            .iter()
            .find(|p| p.external_plan_id == "fil-starter-1gb")
            .unwrap();
        assert_eq!(starter.price_cents, 99);
        assert_eq!(starter.duration_days, 180);
        assert_eq!(starter.size_bytes, 1 << 30);
    }
}
