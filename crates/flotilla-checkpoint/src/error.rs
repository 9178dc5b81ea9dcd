//! Error types and the checkpoint identifier.

use flotilla_types::InstanceId;
use thiserror::Error;

/// Errors from checkpoint creation and rollback.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// An artifact could not be read while creating a checkpoint.
    #[error("checkpoint failed for {instance}: artifact {path} unreadable: {reason}")]
    ArtifactUnreadable {
        instance: InstanceId,
        path: String,
        reason: String,
    },

    /// The referenced checkpoint does not exist.
    #[error("checkpoint not found: {0}")]
    NotFound(CheckpointId),

    /// Rollback could not complete; originals were left untouched.
    #[error("rollback failed for {instance}: {reason}")]
    RollbackFailed {
        instance: InstanceId,
        reason: String,
    },

    /// Blob/checkpoint store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Checkpoint identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CheckpointId(uuid::Uuid);

impl CheckpointId {
    /// Generate a new checkpoint ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from a UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "checkpoint-{}", self.0)
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
