use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::types::TransactionStatus;

const TX_COLUMNS: &str = "id, order_id, provider_id, network, chain_id, tx_hash, status, \
     status_message, confirmations, retry_count, max_retries, block_number, block_hash, \
     gas_used, from_address, to_address, raw_response, submitted_at, confirmed_at, \
     last_retry_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct BlockchainTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_id: Uuid,
    pub network: String,
    pub chain_id: Option<i64>,
    pub tx_hash: Option<String>,
    pub status: String,
    pub status_message: Option<String>,
    pub confirmations: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub block_number: Option<i64>,
    pub block_hash: Option<String>,
    pub gas_used: Option<i64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub raw_response: Option<serde_json::Value>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlockchainTransaction {
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        TransactionStatus::from_db(&self.status)
    }
}

/// Fields recorded after a successful adapter submission.
#[derive(Debug, Clone)]
pub struct SubmissionRecord<'a> {
    pub tx_hash: &'a str,
    pub status: TransactionStatus,
    pub from_address: Option<&'a str>,
    pub to_address: Option<&'a str>,
    pub raw_response: Option<&'a serde_json::Value>,
}

/// Fields refreshed by a status probe.
#[derive(Debug, Clone)]
pub struct StatusProbeRecord<'a> {
    pub status: TransactionStatus,
    pub confirmations: i32,
    pub block_number: Option<i64>,
    pub block_hash: Option<&'a str>,
    pub gas_used: Option<i64>,
    pub status_message: Option<&'a str>,
}

pub struct BlockchainTxRepository {
    pool: PgPool,
}

impl BlockchainTxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the PENDING row that anchors a submission attempt. The partial
    /// unique index on (order_id) WHERE status <> 'FAILED' rejects a second
    /// live transaction for the same order.
    pub async fn create_pending(
        &self,
        order_id: Uuid,
        provider_id: Uuid,
        network: &str,
        chain_id: Option<i64>,
    ) -> Result<BlockchainTransaction, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "INSERT INTO blockchain_transactions (order_id, provider_id, network, chain_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {TX_COLUMNS}"
        ))
        .bind(order_id)
        .bind(provider_id)
        .bind(network)
        .bind(chain_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<BlockchainTransaction>, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM blockchain_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_live_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<BlockchainTransaction>, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM blockchain_transactions
             WHERE order_id = $1 AND status <> 'FAILED'
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_latest_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<BlockchainTransaction>, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM blockchain_transactions
             WHERE order_id = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn record_submission(
        &self,
        id: Uuid,
        record: &SubmissionRecord<'_>,
    ) -> Result<BlockchainTransaction, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "UPDATE blockchain_transactions
             SET tx_hash = $2, status = $3, from_address = $4, to_address = $5,
                 raw_response = $6, submitted_at = now(), updated_at = now()
             WHERE id = $1
             RETURNING {TX_COLUMNS}"
        ))
        .bind(id)
        .bind(record.tx_hash)
        .bind(record.status.as_db())
        .bind(record.from_address)
        .bind(record.to_address)
        .bind(record.raw_response)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Apply a status probe. Skips rows already terminal so a late poller
    /// iteration cannot regress a finished transaction.
    pub async fn apply_status_probe(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
        probe: &StatusProbeRecord<'_>,
    ) -> Result<bool, DatabaseError> {
        let confirmed_at = if probe.status == TransactionStatus::Confirmed {
            Some(Utc::now())
        } else {
            None
        };
        let result = sqlx::query(
            "UPDATE blockchain_transactions
             SET status = $2,
                 confirmations = $3,
                 block_number = COALESCE($4, block_number),
                 block_hash = COALESCE($5, block_hash),
                 gas_used = COALESCE($6, gas_used),
                 status_message = COALESCE($7, status_message),
                 confirmed_at = COALESCE($8, confirmed_at),
                 updated_at = now()
             WHERE id = $1 AND status NOT IN ('CONFIRMED', 'FAILED')",
        )
        .bind(id)
        .bind(probe.status.as_db())
        .bind(probe.confirmations)
        .bind(probe.block_number)
        .bind(probe.block_hash)
        .bind(probe.gas_used)
        .bind(probe.status_message)
        .bind(confirmed_at)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_failed(
        &self,
        executor: impl PgExecutor<'_>,
        id: Uuid,
        message: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE blockchain_transactions
             SET status = 'FAILED', status_message = $2, updated_at = now()
             WHERE id = $1 AND status <> 'CONFIRMED'",
        )
        .bind(id)
        .bind(message)
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Claim a retry slot. The WHERE clause enforces both the FAILED
    /// precondition and the retry budget, so concurrent operators cannot
    /// push retry_count past max_retries.
    pub async fn claim_retry(
        &self,
        id: Uuid,
    ) -> Result<Option<BlockchainTransaction>, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "UPDATE blockchain_transactions
             SET status = 'RETRYING', retry_count = retry_count + 1,
                 last_retry_at = now(), updated_at = now()
             WHERE id = $1 AND status = 'FAILED' AND retry_count < max_retries
             RETURNING {TX_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Transactions the periodic sweep must advance: submitted or confirming
    /// with a known hash.
    pub async fn find_for_sweep(
        &self,
        limit: i64,
    ) -> Result<Vec<BlockchainTransaction>, DatabaseError> {
        sqlx::query_as::<_, BlockchainTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM blockchain_transactions
             WHERE status IN ('SUBMITTED', 'CONFIRMING') AND tx_hash IS NOT NULL
             ORDER BY updated_at
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
