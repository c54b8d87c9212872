//! Error types for rowcache

use thiserror::Error;

/// Result type alias for rowcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for query building, table access and cache operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid registration-time configuration (key groups, codec kinds, TTL)
    #[error("Config error: {0}")]
    Config(String),

    /// Caller misuse of the builder or table API
    #[error("Validation error: {0}")]
    Validation(String),

    /// Field decode/codec error
    #[error("Decode error on field '{field}': {message}")]
    Decode { field: String, message: String },

    /// Query execution error reported by the executor collaborator
    #[error("Query error: {0}")]
    Query(String),

    /// Cache transport error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Row serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a decode error for a specific field
    pub fn decode(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a query execution error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a decode error
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}
