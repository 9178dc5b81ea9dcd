//! Checkpoint record types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flotilla_types::{DeploymentState, InstanceId};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointId;

/// Snapshot of one configuration artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSnapshot {
    /// Path of the artifact in the blob store.
    pub path: String,

    /// Captured contents.
    pub contents: Bytes,
}

/// Immutable snapshot of an instance's configuration artifacts.
///
/// Created before a risky mutation, referenced by id for rollback, and
/// garbage-collected by an external retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Unique identifier.
    pub id: CheckpointId,

    /// Instance the checkpoint belongs to.
    pub instance: InstanceId,

    /// Deployment-state label at capture time.
    pub state_label: DeploymentState,

    /// Why the checkpoint was taken.
    pub reason: String,

    /// Artifact snapshots, in tracked order.
    pub artifacts: Vec<ArtifactSnapshot>,

    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}
