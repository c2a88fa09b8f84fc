//! Error types for the lorebot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them and adds the cross-cutting failure classes (configuration,
//! capacity, partial batch failure).
//!
//! Expected conditions (not found, disabled feature) are **not** errors:
//! components report them as `Option`, `bool`, or counts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Corpus error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Refused: {0}")]
    Security(#[from] SecurityError),

    /// Invalid constructor parameters; fatal at startup
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A bounded store is full
    #[error("Capacity reached: {0}")]
    Capacity(String),

    /// Some items of a batch failed; the rest were applied and stay applied
    #[error("{failed} of {attempted} items failed")]
    PartialFailure { failed: usize, attempted: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Language-model and embedding backends.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// The messaging platform.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Invalid message link: {0}")]
    InvalidLink(String),

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

/// The corpus index and its persistence.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty value for {0}")]
    Empty(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Immutable field '{0}' cannot be changed")]
    ImmutableField(String),

    #[error("Invalid persisted record: {0}")]
    InvalidRecord(String),
}

/// Save/load paths that escape the data directory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SecurityError {
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("Path outside allowed directory: {0}")]
    OutsideScope(String),

    #[error("Refusing to overwrite foreign file: {0}")]
    ForeignFile(String),
}
