//! Error types for the activity facade and its session collaborators.

/// Failure reported by the hosting session layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session invalidated: {0}")]
    Invalidated(String),

    #[error("session layer unavailable: {0}")]
    Unavailable(String),
}

impl SessionError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Invalidated(_) => "session_invalidated",
            Self::Unavailable(_) => "session_unavailable",
        }
    }
}

/// Errors a caller can see from the activity facade. Both are raised before
/// anything is published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot resolve sender identity: {0}")]
    Identity(#[from] SessionError),
}

impl ActivityError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Identity(_) => "identity_unavailable",
        }
    }
}
