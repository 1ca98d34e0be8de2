//! Healer error types.

use thiserror::Error;

use tandem_state::OrderId;

/// Result type alias for healer operations.
pub type HealerResult<T> = Result<T, HealerError>;

/// Errors that can occur while supervising pairs.
#[derive(Debug, Error)]
pub enum HealerError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order table error: {0}")]
    State(#[from] tandem_state::StateError),

    #[error("lease error: {0}")]
    Lease(#[from] tandem_lease::LeaseError),

    #[error("node client error: {0}")]
    Node(#[from] tandem_node::NodeError),

    #[error("orchestration error: {0}")]
    Orch(#[from] tandem_orch::OrchError),

    #[error("replacement for order {order_id} at {address} did not come up")]
    ReplacementUnreachable { order_id: OrderId, address: String },
}
