//! Session error type

use sockpress_core::{ErrorContext, SockpressError};

/// Failures of the backing store. An absent session is never one of these.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Store is not running")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

impl From<SessionError> for SockpressError {
    fn from(error: SessionError) -> Self {
        SockpressError::Session {
            message: error.to_string(),
            source: Some(Box::new(error)),
            context: ErrorContext::new("session_store"),
        }
    }
}
