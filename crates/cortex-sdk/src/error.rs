//! SDK Error Types
//!
//! Defines error types for the Cortex SDK.

use thiserror::Error;

/// SDK Result type alias
pub type CortexResult<T> = Result<T, CortexError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum CortexError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Memory tier operation error
    #[error("memory error: {message}")]
    Memory { message: String },

    /// Plugin registration or dispatch error
    #[error("plugin error: {message}")]
    Plugin { message: String },

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Invalid operation
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Timeout error
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rule book / config file parse error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CortexError {
    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create a plugin error
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::Plugin {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error came from the backing store
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Io(_))
    }
}

impl From<crate::plugins::PluginError> for CortexError {
    fn from(err: crate::plugins::PluginError) -> Self {
        Self::plugin(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CortexError::memory("test error");
        assert!(err.to_string().contains("test error"));

        let err = CortexError::not_found("Conversation", "123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Conversation"));
        assert!(err.to_string().contains("123"));

        let err = CortexError::timeout(5000);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_storage_classification() {
        let err = CortexError::from(rusqlite::Error::InvalidQuery);
        assert!(err.is_storage());
        assert!(!CortexError::plugin("boom").is_storage());
    }
}
