//! Liveness errors - the taxonomy shared by the publish and read paths
//!
//! None of these are user-fatal. The publish side logs and swallows them;
//! the read side degrades to "offline" / "not typing".

use thiserror::Error;

/// Result type for liveness operations
pub type LivenessResult<T> = Result<T, LivenessError>;

/// Liveness kernel errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    /// A publish or subscribe call to the backend failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A received timestamp was absent or unparseable
    #[error("Malformed signal for {subject}: {reason}")]
    MalformedSignal { subject: String, reason: String },

    /// The operation needs an authenticated identity
    #[error("Session is not authenticated")]
    Unauthenticated,

    /// The coordinator or heartbeat was already torn down
    #[error("Session closed")]
    SessionClosed,
}

impl LivenessError {
    /// Build a transport error from any displayable cause
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Build a malformed-signal error
    pub fn malformed(subject: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::MalformedSignal {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }

    /// Get an error code string for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::MalformedSignal { .. } => "MALFORMED_SIGNAL",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::SessionClosed => "SESSION_CLOSED",
        }
    }

    /// Transient errors are retried on the next natural cadence
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LivenessError::transport("down").code(), "TRANSPORT_ERROR");
        assert_eq!(LivenessError::malformed("u1", "empty").code(), "MALFORMED_SIGNAL");
        assert_eq!(LivenessError::Unauthenticated.code(), "UNAUTHENTICATED");
        assert_eq!(LivenessError::SessionClosed.code(), "SESSION_CLOSED");
    }

    #[test]
    fn test_is_transient() {
        assert!(LivenessError::transport("timeout").is_transient());
        assert!(!LivenessError::malformed("u1", "bad").is_transient());
        assert!(!LivenessError::SessionClosed.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = LivenessError::transport("connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");

        let err = LivenessError::malformed("abc", "missing timestamp");
        assert_eq!(err.to_string(), "Malformed signal for abc: missing timestamp");
    }
}
