//! Error types for the cloud client boundary

use thiserror::Error;

/// Result type for cloud client operations
pub type Result<T> = std::result::Result<T, CloudError>;

/// Errors surfaced by a [`crate::CloudClient`] implementation
#[derive(Error, Debug)]
pub enum CloudError {
    /// The request never produced a response (DNS, connect, TLS, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success HTTP status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The GraphQL endpoint answered 200 with an `errors` array
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// The requested pod does not exist (HTTP 404)
    #[error("Pod {0} not found")]
    NotFound(String),

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Credential rejected (HTTP 401/403)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CloudError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an API error from a status code and response body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether this error means the pod is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors parsing domain values from user input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid pod role '{0}', expected 'main' or 'branch'")]
    Role(String),
}
