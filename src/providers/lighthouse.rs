//! Lighthouse adapter (API-backed, IPFS gateway probe).
//!
//! Allocation pins an order manifest through the Lighthouse node and uses
//! the returned CID as the pseudo transaction hash. Identical manifests pin
//! to identical CIDs, which makes resubmission naturally idempotent. The
//! PoDSI proof endpoint for the CID is recorded on the order metadata.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::ApiProviderConfig;
use crate::db::types::{NetworkType, TransactionStatus};
use crate::providers::adapter::{
    AllocationParams, AllocationResult, RemotePlan, StorageAdapter, TxStatusProbe,
};
use crate::providers::error::{AdapterError, AdapterResult};

pub const SLUG: &str = "lighthouse";

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: Option<String>,
}

pub struct LighthouseAdapter {
    http: Client,
    api_url: String,
    gateway_url: String,
    api_key: Option<String>,
}

impl LighthouseAdapter {
    pub fn new(config: &ApiProviderConfig) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AdapterError::configuration(SLUG, format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn api_key(&self) -> AdapterResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AdapterError::configuration(SLUG, "LIGHTHOUSE_API_KEY is not set"))
    }

    /// The pinned manifest. Built only from allocation inputs so the CID is
    /// stable across resubmissions of the same order.
    fn manifest(params: &AllocationParams) -> serde_json::Value {
        json!({
            "order_id": params.order_id,
            "plan": params.plan_external_id,
            "size_bytes": params.size_bytes,
            "duration_days": params.duration_days,
        })
    }

    fn proof_url(&self, cid: &str) -> String {
        format!("{}/api/lighthouse/get_proof?cid={}", self.api_url, cid)
    }
}

#[async_trait]
impl StorageAdapter for LighthouseAdapter {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn network(&self) -> NetworkType {
        NetworkType::Mainnet
    }

    async fn initialize(&self) -> AdapterResult<()> {
        self.api_key()?;
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.http
            .head(format!("{}/", self.gateway_url))
            .send()
            .await
            .map(|r| r.status().is_success() || r.status().is_redirection())
            .unwrap_or(false)
    }

    async fn available_plans(&self) -> AdapterResult<Vec<RemotePlan>> {
        Ok(vec![
            RemotePlan {
                external_plan_id: "lh-perpetual-5gb".to_string(),
                name: "Lighthouse Perpetual 5 GB".to_string(),
                size_gb: 5,
                size_bytes: 5 * (1i64 << 30),
                duration_days: 3650,
                price_cents: 1_499,
                price_native: None,
                currency: "USD".to_string(),
            },
            RemotePlan {
                external_plan_id: "lh-deal-30gb".to_string(),
                name: "Lighthouse Deal 30 GB".to_string(),
                size_gb: 30,
                size_bytes: 30 * (1i64 << 30),
                duration_days: 540,
                price_cents: 2_999,
                price_native: None,
                currency: "USD".to_string(),
            },
        ])
    }

    async fn execute_storage_transaction(
        &self,
        params: &AllocationParams,
    ) -> AdapterResult<AllocationResult> {
        let key = self.api_key()?;
        let manifest = Self::manifest(params);

        let response = self
            .http
            .post(format!("{}/api/v0/add", self.api_url))
            .bearer_auth(key)
            .json(&manifest)
            .send()
            .await
            .map_err(|e| AdapterError::network(SLUG, format!("pin request: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AdapterError::submission(
                SLUG,
                format!("pin request returned HTTP {}: {}", status, body),
            ));
        }

        let added: AddResponse = serde_json::from_str(&body).map_err(|e| {
            AdapterError::submission(SLUG, format!("invalid pin response: {}", e))
        })?;
        info!(order_id = %params.order_id, cid = %added.hash, "lighthouse manifest pinned");

        let endpoint = format!("{}/ipfs/{}", self.gateway_url, added.hash);
        Ok(AllocationResult {
            tx_hash: added.hash.clone(),
            status: TransactionStatus::Submitted,
            from_address: None,
            to_address: None,
            storage_id: Some(added.hash.clone()),
            storage_endpoint: Some(endpoint),
            storage_metadata: Some(json!({
                "cid": added.hash,
                "pinned_size": added.size,
                "podsi_proof_url": self.proof_url(&added.hash),
            })),
            raw_response: serde_json::from_str(&body).ok(),
        })
    }

    async fn check_transaction_status(&self, tx_hash: &str) -> AdapterResult<TxStatusProbe> {
        let response = self
            .http
            .head(format!("{}/ipfs/{}", self.gateway_url, tx_hash))
            .send()
            .await
            .map_err(|e| AdapterError::network(SLUG, format!("gateway probe: {}", e)))?;

        if response.status().is_success() {
            Ok(TxStatusProbe {
                status: TransactionStatus::Confirmed,
                confirmations: 1,
                block_number: None,
                block_hash: None,
                gas_used: None,
                error: None,
            })
        } else {
            Ok(TxStatusProbe::still_pending(TransactionStatus::Confirming))
        }
    }

    fn explorer_url(&self, tx_hash: &str) -> String {
        format!("{}/ipfs/{}", self.gateway_url, tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn config(api_key: Option<&str>) -> ApiProviderConfig {
        ApiProviderConfig {
            api_url: "https://node.lighthouse.storage".to_string(),
            gateway_url: "https://gateway.lighthouse.storage/".to_string(),
            api_key: api_key.map(String::from),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn manifest_is_stable_for_the_same_order() {
        let params = AllocationParams {
            order_id: Uuid::parse_str("5b2f7c3a-8a44-4d7e-9a59-111213141516").unwrap(),
            plan_external_id: "lh-deal-30gb".to_string(),
            size_bytes: 30 * (1u64 << 30),
            duration_days: 540,
            user_wallet: None,
        };
        assert_eq!(
            LighthouseAdapter::manifest(&params),
            LighthouseAdapter::manifest(&params)
        );
    }

    #[test]
    fn explorer_url_is_a_gateway_link() {
        let adapter = LighthouseAdapter::new(&config(Some("key"))).unwrap();
        assert_eq!(
            adapter.explorer_url("bafy123"),
            "https://gateway.lighthouse.storage/ipfs/bafy123"
        );
    }

    #[tokio::test]
    async fn initialize_requires_api_key() {
        let adapter = LighthouseAdapter::new(&config(None)).unwrap();
        assert!(adapter.initialize().await.is_err());
    }
}
