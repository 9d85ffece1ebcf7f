//! Storj adapter (API-backed).
//!
//! Allocation provisions a bucket through the partner API. The bucket name
//! is derived from the order id, so repeated submissions resolve to the same
//! bucket, and the bucket name doubles as the pseudo transaction hash.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::ApiProviderConfig;
use crate::db::types::{NetworkType, TransactionStatus};
use crate::providers::adapter::{
    AllocationParams, AllocationResult, RemotePlan, StorageAdapter, TxStatusProbe,
};
use crate::providers::error::{AdapterError, AdapterResult};

pub const SLUG: &str = "storj";

#[derive(Debug, Deserialize)]
struct BucketResponse {
    id: String,
    name: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub struct StorjAdapter {
    http: Client,
    api_url: String,
    gateway_url: String,
    api_key: Option<String>,
}

impl StorjAdapter {
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

    fn bucket_name(order_id: Uuid) -> String {
        format!("order-{}", order_id.simple())
    }

    fn api_key(&self) -> AdapterResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AdapterError::configuration(SLUG, "STORJ_API_KEY is not set"))
    }

    async fn fetch_bucket(&self, name: &str) -> AdapterResult<Option<BucketResponse>> {
        let key = self.api_key()?;
        let response = self
            .http
            .get(format!("{}/v1/buckets/{}", self.api_url, name))
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| AdapterError::network(SLUG, format!("bucket lookup: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bucket = response.json::<BucketResponse>().await.map_err(|e| {
                    AdapterError::probe(SLUG, format!("invalid bucket response: {}", e))
                })?;
                Ok(Some(bucket))
            }
            status => Err(AdapterError::network(
                SLUG,
                format!("bucket lookup returned HTTP {}", status),
            )),
        }
    }
}

#[async_trait]
impl StorageAdapter for StorjAdapter {
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
                external_plan_id: "storj-basic-25gb".to_string(),
                name: "Storj Basic 25 GB".to_string(),
                size_gb: 25,
                size_bytes: 25 * (1i64 << 30),
                duration_days: 30,
                price_cents: 199,
                price_native: None,
                currency: "USD".to_string(),
            },
            RemotePlan {
                external_plan_id: "storj-pro-150gb".to_string(),
                name: "Storj Pro 150 GB".to_string(),
                size_gb: 150,
                size_bytes: 150 * (1i64 << 30),
                duration_days: 30,
                price_cents: 999,
                price_native: Some(BigDecimal::from(10)),
                currency: "USD".to_string(),
            },
        ])
    }

    async fn execute_storage_transaction(
        &self,
        params: &AllocationParams,
    ) -> AdapterResult<AllocationResult> {
        let key = self.api_key()?;
        let name = Self::bucket_name(params.order_id);

        // Resubmission for the same order reuses the existing bucket.
        if let Some(existing) = self.fetch_bucket(&name).await? {
            info!(order_id = %params.order_id, bucket = %existing.name, "bucket already provisioned");
            return Ok(AllocationResult {
                tx_hash: existing.name.clone(),
                status: TransactionStatus::Submitted,
                from_address: None,
                to_address: None,
                storage_id: Some(existing.id),
                storage_endpoint: existing
                    .endpoint
                    .or_else(|| Some(format!("{}/{}", self.gateway_url, existing.name))),
                storage_metadata: Some(json!({ "bucket": existing.name })),
                raw_response: None,
            });
        }

        let payload = json!({
            "name": name,
            "size_limit_bytes": params.size_bytes,
            "ttl_days": params.duration_days,
        });
        let response = self
            .http
            .post(format!("{}/v1/buckets", self.api_url))
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AdapterError::network(SLUG, format!("bucket create: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AdapterError::submission(
                SLUG,
                format!("bucket create returned HTTP {}: {}", status, body),
            ));
        }

        let bucket: BucketResponse = serde_json::from_str(&body).map_err(|e| {
            AdapterError::submission(SLUG, format!("invalid bucket create response: {}", e))
        })?;
        info!(order_id = %params.order_id, bucket = %bucket.name, "storj bucket provisioned");

        let endpoint = bucket
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.gateway_url, bucket.name));

        Ok(AllocationResult {
            tx_hash: bucket.name.clone(),
            status: TransactionStatus::Submitted,
            from_address: None,
            to_address: None,
            storage_id: Some(bucket.id),
            storage_endpoint: Some(endpoint),
            storage_metadata: Some(json!({
                "bucket": bucket.name,
                "size_limit_bytes": params.size_bytes,
            })),
            raw_response: serde_json::from_str(&body).ok(),
        })
    }

    async fn check_transaction_status(&self, tx_hash: &str) -> AdapterResult<TxStatusProbe> {
        match self.fetch_bucket(tx_hash).await? {
            Some(bucket) => {
                let active = bucket.status.as_deref().map(|s| s == "active").unwrap_or(true);
                if active {
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
            None => Ok(TxStatusProbe::still_pending(TransactionStatus::Confirming)),
        }
    }

    fn explorer_url(&self, tx_hash: &str) -> String {
        format!("{}/browse/{}", self.gateway_url, tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(api_key: Option<&str>) -> ApiProviderConfig {
        ApiProviderConfig {
            api_url: "https://api.storj.example/".to_string(),
            gateway_url: "https://gateway.storjshare.io".to_string(),
            api_key: api_key.map(String::from),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn bucket_name_is_deterministic_per_order() {
        let order_id = Uuid::parse_str("5b2f7c3a-8a44-4d7e-9a59-111213141516").unwrap();
        assert_eq!(
            StorjAdapter::bucket_name(order_id),
            StorjAdapter::bucket_name(order_id)
        );
        assert!(StorjAdapter::bucket_name(order_id).starts_with("order-"));
    }

    #[tokio::test]
    async fn initialize_requires_api_key() {
        let adapter = StorjAdapter::new(&config(None)).unwrap();
        assert!(adapter.initialize().await.is_err());

        let adapter = StorjAdapter::new(&config(Some("key"))).unwrap();
        assert!(adapter.initialize().await.is_ok());
    }

    #[test]
    fn explorer_url_points_at_gateway() {
        let adapter = StorjAdapter::new(&config(Some("key"))).unwrap();
        assert_eq!(
            adapter.explorer_url("order-abc"),
            "https://gateway.storjshare.io/browse/order-abc"
        );
    }
}
