//! Error types for reply orchestration.

use luna_core::error::LunaError;

/// Errors from the reply orchestrator.
///
/// `Upstream` means a retry by the caller is safe (no turn was committed);
/// the input-shaped variants mean the input must change.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("store error: {0}")]
    Store(String),
}

impl ChatError {
    /// True if retrying the same request may succeed.
    pub fn retry_safe(&self) -> bool {
        matches!(self, ChatError::Upstream(_))
    }
}

impl From<LunaError> for ChatError {
    fn from(err: LunaError) -> Self {
        match err {
            LunaError::InvalidInput(msg) => ChatError::InvalidInput(msg),
            LunaError::Upstream(msg) => ChatError::Upstream(msg),
            other => ChatError::Store(other.to_string()),
        }
    }
}
