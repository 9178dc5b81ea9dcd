//! Error types for durable-store backends.

use thiserror::Error;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying backend failure (connection, IO, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A record that must exist was not found.
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
