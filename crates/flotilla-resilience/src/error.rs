//! Error types for recovery dispatch.

use flotilla_store::StoreError;
use flotilla_types::{ErrorCode, InstanceId};
use thiserror::Error;

/// Errors from the auto-recovery dispatcher and threshold policy.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No remediation procedure is registered for the code.
    #[error("no remediation procedure for error code {code} on {instance}")]
    NoProcedure {
        instance: InstanceId,
        code: ErrorCode,
    },

    /// The remediation procedure itself failed.
    #[error("remediation {procedure} for {code} on {instance} failed: {reason}")]
    ProcedureFailed {
        instance: InstanceId,
        code: ErrorCode,
        procedure: String,
        reason: String,
    },

    /// Too many errors inside the trailing window; the deployment must
    /// halt instead of retrying further.
    #[error("{instance} exceeded failure threshold: {count} errors in window (ceiling {ceiling})")]
    FailureThresholdExceeded {
        instance: InstanceId,
        count: usize,
        ceiling: usize,
    },

    /// Durable store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for recovery operations.
pub type Result<T> = std::result::Result<T, RecoveryError>;
