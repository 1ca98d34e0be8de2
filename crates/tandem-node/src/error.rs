//! Node client error types.

use thiserror::Error;

/// Result type alias for node client operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors that can occur while talking to a store instance.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("node {address} is unreachable")]
    Unreachable { address: String },

    #[error("rpc to {address} failed: {reason}")]
    Rpc { address: String, reason: String },
}
