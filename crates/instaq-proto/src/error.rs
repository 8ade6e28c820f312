//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// An instance literal was not of the form `Type.id`.
    #[error("invalid instance literal: {0}")]
    InvalidInstance(String),
}
