//! Unified error handling system
//!
//! Structured error types with context, recovery suggestions, and error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub type SockpressResult<T> = Result<T, SockpressError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type shared by every sockpress crate
#[derive(Error, Debug)]
pub enum SockpressError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Session error: {message}")]
    Session {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("TLS error: {message}")]
    Tls {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl SockpressError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            SockpressError::Config { context, .. } => Some(context),
            SockpressError::Validation { context, .. } => Some(context),
            SockpressError::Session { context, .. } => Some(context),
            SockpressError::Transport { context, .. } => Some(context),
            SockpressError::Tls { context, .. } => Some(context),
            SockpressError::NotFound { context, .. } => Some(context),
            SockpressError::Internal { context, .. } => Some(context),
            SockpressError::Io(_) | SockpressError::Serialization(_) => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            SockpressError::Internal { .. } | SockpressError::Tls { .. } => {
                error!(error_id = ?error_id, error = %self, "Internal error occurred");
            }
            SockpressError::Config { .. } | SockpressError::Validation { .. } => {
                error!(error_id = ?error_id, error = %self, "Configuration or validation error");
            }
            SockpressError::Transport { .. } => {
                warn!(error_id = ?error_id, error = %self, "Transport error (connection dropped)");
            }
            SockpressError::NotFound { .. } => {
                debug!(error_id = ?error_id, error = %self, "Resource not found");
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::SockpressError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Check SOCKPRESS_* environment variables"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SockpressError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::SockpressError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! tls_error {
    ($msg:expr, $component:expr) => {
        $crate::SockpressError::Tls {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the certificate and key PEM files"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SockpressError::Tls {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the certificate and key PEM files"),
        }
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($resource:expr, $component:expr) => {
        $crate::SockpressError::NotFound {
            resource: $resource.to_string(),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let context = ErrorContext::new("io")
            .with_operation("register")
            .with_metadata("event", "PING")
            .with_suggestion("Pick another name");

        assert_eq!(context.component, "io");
        assert_eq!(context.operation.as_deref(), Some("register"));
        assert_eq!(context.metadata.get("event").map(String::as_str), Some("PING"));
        assert_eq!(context.recovery_suggestions.len(), 1);
        assert!(!context.error_id.is_empty());
    }

    #[test]
    fn test_validation_macro_sets_field() {
        let error = validation_error!("Event name is reserved", "event", "io_router");
        match &error {
            SockpressError::Validation { field, context, .. } => {
                assert_eq!(field.as_deref(), Some("event"));
                assert_eq!(context.component, "io_router");
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
        assert!(error.to_string().contains("reserved"));
    }

    #[test]
    fn test_io_error_has_no_context() {
        let error: SockpressError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken").into();
        assert!(error.context().is_none());
        error.log();
    }
}
