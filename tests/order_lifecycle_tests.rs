//! Lifecycle laws over the order and transaction state machines.

use stormesh_backend::db::types::{OrderStatus, PaymentStatus, TransactionStatus};

const ALL_ORDER_STATES: [OrderStatus; 11] = [
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
];

#[test]
fn the_happy_path_walks_the_documented_chain() {
    let chain = [
        OrderStatus::PendingPayment,
        OrderStatus::PaymentCompleted,
        OrderStatus::BlockchainPending,
        OrderStatus::BlockchainProcessing,
        OrderStatus::BlockchainConfirmed,
        OrderStatus::Completed,
    ];
    for pair in chain.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "{} -> {} should be legal",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn no_state_reaches_a_lower_rank_except_the_retry_edge() {
    for from in ALL_ORDER_STATES {
        for to in from.valid_transitions() {
            if from == OrderStatus::BlockchainFailed {
                continue;
            }
            assert!(
                to.rank() > from.rank(),
                "{} -> {} moves backward",
                from,
                to
            );
        }
    }
}

#[test]
fn cancelled_orders_never_advance() {
    // Scenario: buyer cancels, then a late checkout.session.completed
    // arrives. CANCELLED has no outgoing edges, so the webhook guard
    // rejects the advance.
    assert!(OrderStatus::Cancelled.valid_transitions().is_empty());
    assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::PaymentCompleted));
    assert!(OrderStatus::Cancelled.is_terminal());
}

#[test]
fn refunded_is_reachable_only_from_completed() {
    for from in ALL_ORDER_STATES {
        let reaches = from.can_transition_to(OrderStatus::Refunded);
        assert_eq!(reaches, from == OrderStatus::Completed, "from {}", from);
    }
}

#[test]
fn only_pending_payment_is_cancellable() {
    for status in ALL_ORDER_STATES {
        assert_eq!(
            status.is_cancellable(),
            status == OrderStatus::PendingPayment,
            "{}",
            status
        );
    }
}

#[test]
fn failed_states_are_terminal_but_blockchain_failed_can_reenter() {
    assert!(OrderStatus::PaymentFailed.is_terminal());
    assert!(OrderStatus::BlockchainFailed.is_terminal());
    assert!(OrderStatus::BlockchainFailed.can_transition_to(OrderStatus::BlockchainPending));
    assert!(OrderStatus::PaymentFailed.valid_transitions().is_empty());
}

#[test]
fn db_strings_survive_a_round_trip_for_every_enum() {
    for status in ALL_ORDER_STATES {
        assert_eq!(OrderStatus::from_db(status.as_db()), Some(status));
    }
    for status in [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
    ] {
        assert_eq!(PaymentStatus::from_db(status.as_db()), Some(status));
    }
    for status in [
        TransactionStatus::Pending,
        TransactionStatus::Submitted,
        TransactionStatus::Confirming,
        TransactionStatus::Confirmed,
        TransactionStatus::Failed,
        TransactionStatus::Retrying,
    ] {
        assert_eq!(TransactionStatus::from_db(status.as_db()), Some(status));
    }
}

#[test]
fn a_single_live_transaction_means_everything_but_failed() {
    // The partial unique index enforces this shape; the enum must agree.
    let live: Vec<TransactionStatus> = [
        TransactionStatus::Pending,
        TransactionStatus::Submitted,
        TransactionStatus::Confirming,
        TransactionStatus::Confirmed,
        TransactionStatus::Failed,
        TransactionStatus::Retrying,
    ]
    .into_iter()
    .filter(|s| s.is_live())
    .collect();
    assert_eq!(live.len(), 5);
    assert!(!live.contains(&TransactionStatus::Failed));
}

#[test]
fn succeeded_payments_still_count_as_live() {
    // P2: at most one payment in {PENDING, PROCESSING, SUCCEEDED}.
    assert!(PaymentStatus::Succeeded.is_live());
    assert!(PaymentStatus::Succeeded.is_terminal());
}
