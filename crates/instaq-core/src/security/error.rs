//! Access-control error types.

use thiserror::Error;

/// Errors raised by access oracles and capability parsing.
///
/// An oracle error never aborts an evaluation; the instance it was asked about
/// is treated as denied.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The oracle could not reach a decision.
    #[error("access oracle failed: {0}")]
    Oracle(String),

    /// Invalid capability string format.
    #[error("invalid capability format: {0}")]
    InvalidCapabilityFormat(String),
}

/// Result type for access-control operations.
pub type AccessResult<T> = std::result::Result<T, AccessError>;
