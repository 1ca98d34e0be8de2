//! Orchestration error types.

use thiserror::Error;

/// Result type alias for driver operations.
pub type OrchResult<T> = Result<T, OrchError>;

/// Errors reported by the container runtime driver.
#[derive(Debug, Error)]
pub enum OrchError {
    /// A momentary runtime hiccup; retrying may succeed.
    #[error("transient runtime failure: {0}")]
    Transient(String),

    /// A rejected request or unrecoverable runtime state; retrying the
    /// same call cannot succeed.
    #[error("permanent runtime failure: {0}")]
    Permanent(String),
}

impl OrchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OrchError::Transient(_))
    }
}
