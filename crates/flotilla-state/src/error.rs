//! Error types for state consistency and locking.

use flotilla_store::StoreError;
use flotilla_types::InstanceId;
use thiserror::Error;

/// Errors from the state consistency engine.
#[derive(Debug, Error)]
pub enum StateError {
    /// The stored checksum does not match a recomputation; the record was
    /// tampered with or partially written. Never auto-fixed.
    #[error("checksum mismatch for {instance}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        instance: InstanceId,
        expected: String,
        actual: String,
    },

    /// The runtime probe failed.
    #[error("runtime probe failed for {instance}: {reason}")]
    Probe {
        instance: InstanceId,
        reason: String,
    },

    /// Durable store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the deployment lock manager.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder owns the lock; reported as "already in progress".
    #[error("deployment already in progress for {instance} (held by {holder})")]
    AlreadyHeld {
        instance: InstanceId,
        holder: String,
    },

    /// The bounded wait elapsed without the lock becoming free.
    #[error("timed out after {waited_secs}s waiting for lock on {instance}")]
    Timeout {
        instance: InstanceId,
        waited_secs: u64,
    },

    /// Release was attempted by a caller that does not hold the lock.
    #[error("lock on {instance} is not held by this caller")]
    NotHeld { instance: InstanceId },

    /// Durable store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
