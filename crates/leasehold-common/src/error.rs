//! Error types surfaced to lock clients
//!
//! `Denied` is deliberately absent: a denial is a business outcome carried by
//! the operation result types, not an error.

/// Errors returned by lease and lock operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Malformed request (bad TTL, empty identifiers). Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The lease store could not be reached. Always safe to retry.
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    /// The lease was lost while the caller believed it held it
    #[error("lease on '{lock_name}' lost: {reason}")]
    LeaseLost { lock_name: String, reason: String },

    /// Store corruption or a broken internal invariant
    #[error("internal error: {0}")]
    Internal(String),
}

impl LockError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::invalid_argument("ttl must be positive");
        assert_eq!(err.to_string(), "invalid argument: ttl must be positive");

        let err = LockError::Unavailable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "lease store unavailable: connection refused"
        );

        let err = LockError::LeaseLost {
            lock_name: "db-migration".to_string(),
            reason: "expired".to_string(),
        };
        assert_eq!(err.to_string(), "lease on 'db-migration' lost: expired");
    }

    #[test]
    fn test_retryable() {
        assert!(LockError::Unavailable("down".to_string()).is_retryable());
        assert!(!LockError::invalid_argument("bad").is_retryable());
        assert!(!LockError::Internal("bug".to_string()).is_retryable());
    }
}
