//! Error types for graph translation

use thiserror::Error;

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while translating the host graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// The host's translation primitive is not available
    #[error("Host graph unavailable: {0}")]
    HostUnavailable(String),

    /// The host returned a payload that is not a job graph
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Create a host-unavailable error with a message
    pub fn host_unavailable(msg: impl Into<String>) -> Self {
        Self::HostUnavailable(msg.into())
    }
}
