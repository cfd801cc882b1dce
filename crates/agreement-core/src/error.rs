//! # Error Types
//!
//! Errors raised while constructing or parsing the foundational types.
//! All errors use `thiserror` for derive-based `Display` and `Error`.

use thiserror::Error;

/// Error constructing or parsing a core primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An address string was not `0x` followed by 40 hex characters.
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An amount string was not a non-negative decimal integer.
    #[error("invalid amount {0:?}: expected a non-negative decimal integer")]
    InvalidAmount(String),

    /// Checked arithmetic on amounts overflowed or underflowed.
    #[error("amount arithmetic out of range: {0}")]
    AmountOutOfRange(String),

    /// Token identifiers must be non-empty.
    #[error("token identifier must not be empty")]
    EmptyToken,

    /// A timestamp could not be parsed or is out of range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
