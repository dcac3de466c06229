//! Error types for the orchestrator

use podctl_core::{CloudError, PodRole, PodStatus};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Orchestrator result type
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur in the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Provider call failed (transport, API status, decode)
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// HTTP client error outside the provider API (health probe)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No pod exists for the role and deployment was not requested
    #[error("No {0} pod found")]
    PodNotFound(PodRole),

    /// A wait ran out of time. Distinct from a remote failure.
    #[error("{operation} of pod {pod_id} did not complete within {timeout:?}")]
    Timeout {
        operation: &'static str,
        pod_id: String,
        timeout: Duration,
    },

    /// The pod reached a terminal-negative state while we waited
    #[error("Pod {pod_id} went {status} during {operation}")]
    RemoteFailure {
        operation: &'static str,
        pod_id: String,
        status: PodStatus,
    },

    /// The catalogue had nothing at or below the price ceiling
    #[error("No affordable GPU at or below ${0}/hr")]
    NoAffordableGpu(Decimal),

    /// Every candidate failed with a recoverable reason
    #[error("All GPU candidates failed: {}", .attempts.join("; "))]
    CandidatesExhausted { attempts: Vec<String> },

    /// A creation failure that must not fall through to the next GPU
    #[error("Pod creation on {gpu} aborted: {source}")]
    CreateAborted {
        gpu: String,
        #[source]
        source: CloudError,
    },
}

impl OrchestratorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: &'static str, pod_id: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation,
            pod_id: pod_id.into(),
            timeout,
        }
    }

    /// Create a remote failure error
    pub fn remote_failure(
        operation: &'static str,
        pod_id: impl Into<String>,
        status: PodStatus,
    ) -> Self {
        Self::RemoteFailure {
            operation,
            pod_id: pod_id.into(),
            status,
        }
    }

    /// Resource exhaustion the operator can act on (raise the ceiling, wait)
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::NoAffordableGpu(_) | Self::CandidatesExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_lists_attempts() {
        let err = OrchestratorError::CandidatesExhausted {
            attempts: vec![
                "RTX A4000: capacity".to_string(),
                "RTX 3090: funds".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "All GPU candidates failed: RTX A4000: capacity; RTX 3090: funds"
        );
        assert!(err.is_exhaustion());
    }

    #[test]
    fn test_timeout_is_not_exhaustion() {
        let err = OrchestratorError::timeout("start", "abc123", Duration::from_secs(600));
        assert!(!err.is_exhaustion());
        assert!(err.to_string().contains("abc123"));
    }
}
