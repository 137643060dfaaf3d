//! Common error types for instance-shape.
//!
//! This module provides shared error types for parsing domain values that
//! arrive as free-form strings (CLI arguments, desired-state documents).

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while interpreting domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A device slot name outside `sda`..`sdh` was provided.
    #[error("unknown device slot: {0}")]
    UnknownSlot(String),

    /// A filesystem kind the provider does not support.
    #[error("unknown filesystem: {0}")]
    UnknownFilesystem(String),

    /// A timestamp that is neither RFC 3339 nor the provider's zone-less format.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
