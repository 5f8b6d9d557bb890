use std::time::Duration;
use thiserror::Error;

/// Result type alias for composite operations
pub type Result<T, E = CompositeError> = std::result::Result<T, E>;

/// Errors surfaced by the composite core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    /// Caller error. Carries the offending message verbatim, including
    /// messages relayed from a downstream 422.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    /// Transport failure, unexpected downstream status or open circuit.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The wall-clock bound on the critical path was exceeded.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to enqueue write intent: {0}")]
    EnqueueFailed(String),
}

impl CompositeError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompositeError::DependencyUnavailable(_))
    }

    /// Whether the error says something about the health of the dependency,
    /// as opposed to the request itself.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            CompositeError::DependencyUnavailable(_) | CompositeError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for CompositeError {
    fn from(e: reqwest::Error) -> Self {
        CompositeError::DependencyUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let unavailable = CompositeError::DependencyUnavailable("connection refused".into());
        assert!(unavailable.is_retryable());
        assert!(unavailable.is_dependency_failure());

        let timeout = CompositeError::Timeout(Duration::from_secs(2));
        assert!(!timeout.is_retryable());
        assert!(timeout.is_dependency_failure());

        let not_found = CompositeError::NotFound("No post found for postId: 13".into());
        assert!(!not_found.is_retryable());
        assert!(!not_found.is_dependency_failure());
        assert_eq!(not_found.to_string(), "No post found for postId: 13");
    }
}
