//! Error types for the provider client.

use thiserror::Error;

/// Errors that can occur while talking to the compute provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider rejected the request.
    #[error("provider API error ({status}): {reasons}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Reasons reported in the error body, joined with `; `.
        reasons: String,
    },

    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Client configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Check if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) | Self::Decode(_) | Self::Config(_) => false,
        }
    }

    /// The HTTP status behind this error, if there was a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Transport(_) | Self::Decode(_) | Self::Config(_) => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// A specialized Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
