//! Lease allocation error types.

use thiserror::Error;

/// Errors that can occur while parsing network inputs or allocating.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("subnet {subnet} has no free addresses")]
    Exhausted { subnet: String },
}

pub type LeaseResult<T> = Result<T, LeaseError>;
