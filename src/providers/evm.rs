//! Shared FEVM plumbing for blockchain-backed adapters.
//!
//! Submission goes through the platform storage-market contract; the order
//! reference passed on-chain is `keccak256(order_id)`, so resubmitting the
//! same order can never reserve twice.

use alloy::{
    network::EthereumWallet,
    primitives::{keccak256, Address, B256},
    providers::{Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::types::TransactionStatus;
use crate::providers::adapter::TxStatusProbe;
use crate::providers::error::{AdapterError, AdapterResult};

/// Receipts below this depth report CONFIRMING rather than CONFIRMED.
pub const CONFIRMATION_THRESHOLD: u64 = 5;

/// Fallback when gas estimation fails; generous enough for a reservation.
const DEFAULT_GAS_LIMIT: u64 = 900_000;

sol! {
    #[sol(rpc)]
    interface IStorageMarket {
        function reserveStorage(
            bytes32 orderRef,
            uint64 sizeBytes,
            uint32 durationDays,
            address beneficiary
        ) external returns (uint256 dealId);
    }
}

#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub raw_response: serde_json::Value,
}

pub struct FevmClient {
    slug: &'static str,
    rpc_url: String,
    chain_id: u64,
    wallet: Option<EthereumWallet>,
    market: Option<Address>,
}

impl FevmClient {
    pub fn new(
        slug: &'static str,
        rpc_url: String,
        chain_id: u64,
        private_key: Option<&str>,
        market_address: Option<&str>,
    ) -> AdapterResult<Self> {
        let wallet = match private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key.parse().map_err(|e| {
                    AdapterError::configuration(slug, format!("invalid private key: {}", e))
                })?;
                Some(EthereumWallet::from(signer))
            }
            None => None,
        };
        let market = match market_address {
            Some(addr) => Some(addr.parse::<Address>().map_err(|e| {
                AdapterError::configuration(slug, format!("invalid market address: {}", e))
            })?),
            None => None,
        };
        Ok(Self {
            slug,
            rpc_url,
            chain_id,
            wallet,
            market,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    /// Deterministic on-chain reference for an order.
    pub fn order_ref(order_id: Uuid) -> B256 {
        keccak256(order_id.as_bytes())
    }

    /// Deterministic pseudo-hash for mock submissions; never reaches a node.
    pub fn mock_tx_hash(slug: &str, order_id: Uuid) -> String {
        format!("{}", keccak256(format!("{}-mock:{}", slug, order_id)))
    }

    fn provider(&self) -> AdapterResult<impl Provider> {
        let url = self.rpc_url.parse().map_err(|e| {
            AdapterError::configuration(self.slug, format!("invalid RPC URL: {}", e))
        })?;
        Ok(ProviderBuilder::new().connect_http(url))
    }

    pub async fn block_number(&self) -> AdapterResult<u64> {
        let provider = self.provider()?;
        provider
            .get_block_number()
            .await
            .map_err(|e| AdapterError::network(self.slug, format!("eth_blockNumber: {}", e)))
    }

    /// Verify the node answers and sits on the expected chain.
    pub async fn check_chain(&self) -> AdapterResult<()> {
        let provider = self.provider()?;
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| AdapterError::network(self.slug, format!("eth_chainId: {}", e)))?;
        if chain_id != self.chain_id {
            warn!(
                provider = self.slug,
                expected = self.chain_id,
                actual = chain_id,
                "chain id mismatch"
            );
        }
        Ok(())
    }

    pub async fn submit_reservation(
        &self,
        order_id: Uuid,
        size_bytes: u64,
        duration_days: u32,
        beneficiary: Option<Address>,
    ) -> AdapterResult<SubmittedTx> {
        let wallet = self.wallet.as_ref().ok_or_else(|| {
            AdapterError::configuration(self.slug, "no hot wallet configured for submission")
        })?;
        let market = self.market.ok_or_else(|| {
            AdapterError::configuration(self.slug, "storage market address not configured")
        })?;
        let url = self.rpc_url.parse().map_err(|e| {
            AdapterError::configuration(self.slug, format!("invalid RPC URL: {}", e))
        })?;

        let from_address = wallet.default_signer().address();
        let provider = ProviderBuilder::new().wallet(wallet.clone()).connect_http(url);
        let contract = IStorageMarket::new(market, &provider);

        let order_ref = Self::order_ref(order_id);
        let call = contract.reserveStorage(
            order_ref,
            size_bytes,
            duration_days,
            beneficiary.unwrap_or(Address::ZERO),
        );

        // 2x estimation buffer; fall back to a fixed limit when the node
        // refuses to estimate.
        let gas_limit = match call.estimate_gas().await {
            Ok(estimate) => estimate.saturating_mul(2),
            Err(e) => {
                warn!(provider = self.slug, error = %e, "gas estimation failed, using fallback");
                DEFAULT_GAS_LIMIT
            }
        };
        debug!(provider = self.slug, gas_limit, "submitting storage reservation");

        let pending = call.gas(gas_limit).send().await.map_err(|e| {
            AdapterError::submission(self.slug, format!("reserveStorage: {}", e))
        })?;
        let tx_hash = *pending.tx_hash();

        Ok(SubmittedTx {
            tx_hash: format!("{}", tx_hash),
            from_address: format!("{}", from_address),
            to_address: format!("{}", market),
            raw_response: json!({
                "order_ref": format!("{}", order_ref),
                "gas_limit": gas_limit,
                "chain_id": self.chain_id,
            }),
        })
    }

    pub async fn probe(&self, tx_hash: &str) -> AdapterResult<TxStatusProbe> {
        let hash: B256 = tx_hash
            .parse()
            .map_err(|e| AdapterError::probe(self.slug, format!("invalid tx hash: {}", e)))?;
        let provider = self.provider()?;

        let receipt = provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| AdapterError::network(self.slug, format!("receipt fetch: {}", e)))?;

        let receipt = match receipt {
            // Not yet mined; the transaction stays submitted.
            None => return Ok(TxStatusProbe::still_pending(TransactionStatus::Submitted)),
            Some(receipt) => receipt,
        };

        let head = provider
            .get_block_number()
            .await
            .map_err(|e| AdapterError::network(self.slug, format!("eth_blockNumber: {}", e)))?;

        let block_number = receipt.block_number;
        let confirmations = block_number
            .map(|mined| head.saturating_sub(mined) + 1)
            .unwrap_or(0);

        let (status, error) = if !receipt.status() {
            (TransactionStatus::Failed, Some("reverted".to_string()))
        } else if confirmations >= CONFIRMATION_THRESHOLD {
            (TransactionStatus::Confirmed, None)
        } else {
            (TransactionStatus::Confirming, None)
        };

        Ok(TxStatusProbe {
            status,
            confirmations: confirmations.min(u32::MAX as u64) as u32,
            block_number,
            block_hash: receipt.block_hash.map(|h| format!("{}", h)),
            gas_used: u64::try_from(receipt.gas_used).ok(),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ref_is_deterministic() {
        let order_id = Uuid::parse_str("5b2f7c3a-8a44-4d7e-9a59-111213141516").unwrap();
        assert_eq!(FevmClient::order_ref(order_id), FevmClient::order_ref(order_id));
        assert_ne!(
            FevmClient::order_ref(order_id),
            FevmClient::order_ref(Uuid::new_v4())
        );
    }

    #[test]
    fn mock_hash_is_deterministic_and_hex() {
        let order_id = Uuid::parse_str("5b2f7c3a-8a44-4d7e-9a59-111213141516").unwrap();
        let a = FevmClient::mock_tx_hash("filecoin", order_id);
        let b = FevmClient::mock_tx_hash("filecoin", order_id);
        assert_eq!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
        assert_ne!(a, FevmClient::mock_tx_hash("greenfield", order_id));
    }

    #[test]
    fn invalid_private_key_is_a_configuration_error() {
        let result = FevmClient::new(
            "filecoin",
            "https://api.node.glif.io/rpc/v1".to_string(),
            314,
            Some("not-a-key"),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn client_without_wallet_reports_no_wallet() {
        let client = FevmClient::new(
            "filecoin",
            "https://api.node.glif.io/rpc/v1".to_string(),
            314,
            None,
            None,
        )
        .unwrap();
        assert!(!client.has_wallet());
        assert_eq!(client.chain_id(), 314);
    }
}
