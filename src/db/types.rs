//! Status enumerations shared between the store, the orchestrator, and the
//! API surface. Stored as upper-snake text columns; the `as_db` / `from_db`
//! pair is the single source of truth for the wire strings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkType {
    Testnet,
    Mainnet,
}

impl NetworkType {
    pub fn as_db(&self) -> &'static str {
        match self {
            NetworkType::Testnet => "TESTNET",
            NetworkType::Mainnet => "MAINNET",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "TESTNET" => Some(NetworkType::Testnet),
            "MAINNET" => Some(NetworkType::Mainnet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Active,
    Inactive,
    Maintenance,
    Deprecated,
}

impl ProviderStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "ACTIVE",
            ProviderStatus::Inactive => "INACTIVE",
            ProviderStatus::Maintenance => "MAINTENANCE",
            ProviderStatus::Deprecated => "DEPRECATED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(ProviderStatus::Active),
            "INACTIVE" => Some(ProviderStatus::Inactive),
            "MAINTENANCE" => Some(ProviderStatus::Maintenance),
            "DEPRECATED" => Some(ProviderStatus::Deprecated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Available,
    Unavailable,
    Deprecated,
}

impl PlanStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            PlanStatus::Available => "AVAILABLE",
            PlanStatus::Unavailable => "UNAVAILABLE",
            PlanStatus::Deprecated => "DEPRECATED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "AVAILABLE" => Some(PlanStatus::Available),
            "UNAVAILABLE" => Some(PlanStatus::Unavailable),
            "DEPRECATED" => Some(PlanStatus::Deprecated),
            _ => None,
        }
    }
}

/// Order lifecycle states. Transitions form a DAG; `valid_transitions`
/// encodes every permitted edge, including the operator retry re-entry from
/// BLOCKCHAIN_FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    PaymentProcessing,
    PaymentCompleted,
    PaymentFailed,
    Cancelled,
    BlockchainPending,
    BlockchainProcessing,
    BlockchainConfirmed,
    BlockchainFailed,
    Completed,
    Refunded,
}

impl OrderStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::PaymentProcessing => "PAYMENT_PROCESSING",
            OrderStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::BlockchainPending => "BLOCKCHAIN_PENDING",
            OrderStatus::BlockchainProcessing => "BLOCKCHAIN_PROCESSING",
            OrderStatus::BlockchainConfirmed => "BLOCKCHAIN_CONFIRMED",
            OrderStatus::BlockchainFailed => "BLOCKCHAIN_FAILED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING_PAYMENT" => Some(OrderStatus::PendingPayment),
            "PAYMENT_PROCESSING" => Some(OrderStatus::PaymentProcessing),
            "PAYMENT_COMPLETED" => Some(OrderStatus::PaymentCompleted),
            "PAYMENT_FAILED" => Some(OrderStatus::PaymentFailed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "BLOCKCHAIN_PENDING" => Some(OrderStatus::BlockchainPending),
            "BLOCKCHAIN_PROCESSING" => Some(OrderStatus::BlockchainProcessing),
            "BLOCKCHAIN_CONFIRMED" => Some(OrderStatus::BlockchainConfirmed),
            "BLOCKCHAIN_FAILED" => Some(OrderStatus::BlockchainFailed),
            "COMPLETED" => Some(OrderStatus::Completed),
            "REFUNDED" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn valid_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::PendingPayment => &[
                OrderStatus::PaymentProcessing,
                OrderStatus::PaymentCompleted,
                OrderStatus::Cancelled,
            ],
            OrderStatus::PaymentProcessing => {
                &[OrderStatus::PaymentCompleted, OrderStatus::PaymentFailed]
            }
            OrderStatus::PaymentCompleted => &[OrderStatus::BlockchainPending],
            OrderStatus::BlockchainPending => &[OrderStatus::BlockchainProcessing],
            OrderStatus::BlockchainProcessing => &[
                OrderStatus::BlockchainConfirmed,
                OrderStatus::BlockchainFailed,
            ],
            OrderStatus::BlockchainConfirmed => &[OrderStatus::Completed],
            OrderStatus::BlockchainFailed => &[OrderStatus::BlockchainPending],
            OrderStatus::Completed => &[OrderStatus::Refunded],
            OrderStatus::PaymentFailed | OrderStatus::Cancelled | OrderStatus::Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Terminal for the happy path; the *_FAILED states remain retryable by
    /// operator action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Refunded
                | OrderStatus::Cancelled
                | OrderStatus::PaymentFailed
                | OrderStatus::BlockchainFailed
        )
    }

    /// Buyer cancellation is only legal before payment.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Position along the lifecycle; a transition never decreases it except
    /// for the explicit BLOCKCHAIN_FAILED retry edge.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::PendingPayment => 0,
            OrderStatus::PaymentProcessing => 1,
            OrderStatus::Cancelled | OrderStatus::PaymentFailed => 2,
            OrderStatus::PaymentCompleted => 3,
            OrderStatus::BlockchainPending => 4,
            OrderStatus::BlockchainProcessing => 5,
            OrderStatus::BlockchainFailed => 6,
            OrderStatus::BlockchainConfirmed => 7,
            OrderStatus::Completed => 8,
            OrderStatus::Refunded => 9,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    /// A live payment blocks creation of another one for the same order.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Succeeded
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Submitted,
    Confirming,
    Confirmed,
    Failed,
    Retrying,
}

impl TransactionStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Submitted => "SUBMITTED",
            TransactionStatus::Confirming => "CONFIRMING",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Retrying => "RETRYING",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(TransactionStatus::Pending),
            "SUBMITTED" => Some(TransactionStatus::Submitted),
            "CONFIRMING" => Some(TransactionStatus::Confirming),
            "CONFIRMED" => Some(TransactionStatus::Confirmed),
            "FAILED" => Some(TransactionStatus::Failed),
            "RETRYING" => Some(TransactionStatus::Retrying),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }

    /// A non-FAILED transaction counts against the one-live-per-order rule.
    pub fn is_live(&self) -> bool {
        !matches!(self, TransactionStatus::Failed)
    }

    /// txHash must be present at SUBMITTED and beyond.
    pub fn requires_hash(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Submitted
                | TransactionStatus::Confirming
                | TransactionStatus::Confirmed
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_db_strings_round_trip() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::PaymentProcessing,
            OrderStatus::PaymentCompleted,
            OrderStatus::PaymentFailed,
            OrderStatus::Cancelled,
            OrderStatus::BlockchainPending,
            OrderStatus::BlockchainProcessing,
            OrderStatus::BlockchainConfirmed,
            OrderStatus::BlockchainFailed,
            OrderStatus::Completed,
            OrderStatus::Refunded,
        ] {
            assert_eq!(OrderStatus::from_db(status.as_db()), Some(status));
        }
        assert_eq!(OrderStatus::from_db("BOGUS"), None);
    }

    #[test]
    fn happy_path_edges_are_permitted() {
        assert!(OrderStatus::PendingPayment.can_transition_to(OrderStatus::PaymentCompleted));
        assert!(OrderStatus::PaymentCompleted.can_transition_to(OrderStatus::BlockchainPending));
        assert!(OrderStatus::BlockchainPending.can_transition_to(OrderStatus::BlockchainProcessing));
        assert!(
            OrderStatus::BlockchainProcessing.can_transition_to(OrderStatus::BlockchainConfirmed)
        );
        assert!(OrderStatus::BlockchainConfirmed.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn backward_edges_are_rejected() {
        assert!(!OrderStatus::PaymentCompleted.can_transition_to(OrderStatus::PendingPayment));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::BlockchainProcessing));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::PaymentCompleted));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn cancel_is_only_legal_before_payment() {
        assert!(OrderStatus::PendingPayment.is_cancellable());
        assert!(!OrderStatus::PaymentCompleted.is_cancellable());
        assert!(!OrderStatus::BlockchainProcessing.is_cancellable());
    }

    #[test]
    fn retry_edge_exists_from_blockchain_failed() {
        assert!(OrderStatus::BlockchainFailed.can_transition_to(OrderStatus::BlockchainPending));
    }

    #[test]
    fn forward_edges_never_lower_rank_except_retry() {
        for from in [
            OrderStatus::PendingPayment,
            OrderStatus::PaymentProcessing,
            OrderStatus::PaymentCompleted,
            OrderStatus::BlockchainPending,
            OrderStatus::BlockchainProcessing,
            OrderStatus::BlockchainConfirmed,
            OrderStatus::Completed,
        ] {
            for target in from.valid_transitions() {
                assert!(
                    target.rank() > from.rank(),
                    "{} -> {} lowers rank",
                    from,
                    target
                );
            }
        }
    }

    #[test]
    fn payment_liveness_matches_contract() {
        assert!(PaymentStatus::Pending.is_live());
        assert!(PaymentStatus::Succeeded.is_live());
        assert!(!PaymentStatus::Failed.is_live());
        assert!(!PaymentStatus::Cancelled.is_live());
    }

    #[test]
    fn transaction_hash_requirement_starts_at_submitted() {
        assert!(!TransactionStatus::Pending.requires_hash());
        assert!(TransactionStatus::Submitted.requires_hash());
        assert!(TransactionStatus::Confirmed.requires_hash());
        assert!(!TransactionStatus::Retrying.requires_hash());
    }

    #[test]
    fn only_failed_transactions_are_not_live() {
        assert!(TransactionStatus::Pending.is_live());
        assert!(TransactionStatus::Retrying.is_live());
        assert!(TransactionStatus::Confirmed.is_live());
        assert!(!TransactionStatus::Failed.is_live());
    }
}
