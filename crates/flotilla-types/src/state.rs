//! Deployment state vocabulary and the checksummed state record.
//!
//! Deployment state lives in two places: a durable authoritative store and
//! a fast local mirror. Both hold append-only histories of
//! [`DeploymentStateRecord`] rows; the most recent row per instance is the
//! current state. Records carry an integrity checksum over the state label
//! and metadata so corruption is distinguishable from ordinary divergence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ids::InstanceId;

/// State of an instance's deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    /// No deployment has run, or state could not be determined.
    Unknown,

    /// A deployment workflow is mutating the instance.
    Deploying,

    /// Services are up; post-deployment verification is running.
    Verifying,

    /// Deployment finished and verified.
    Complete,

    /// Deployment failed; the instance needs operator attention.
    Failed,

    /// Configuration was restored from a checkpoint.
    RolledBack,
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentState::Unknown => write!(f, "unknown"),
            DeploymentState::Deploying => write!(f, "deploying"),
            DeploymentState::Verifying => write!(f, "verifying"),
            DeploymentState::Complete => write!(f, "complete"),
            DeploymentState::Failed => write!(f, "failed"),
            DeploymentState::RolledBack => write!(f, "rolled-back"),
        }
    }
}

/// One row of an instance's deployment-state history.
///
/// Append-only in both the authoritative store and the local mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStateRecord {
    /// Instance this record is for.
    pub instance: InstanceId,

    /// State label.
    pub state: DeploymentState,

    /// Human-readable reason for the transition.
    pub reason: String,

    /// Opaque metadata attached by the caller.
    pub metadata: Value,

    /// Integrity checksum over (state, metadata).
    pub checksum: String,

    /// When the record was written.
    pub timestamp: DateTime<Utc>,
}

impl DeploymentStateRecord {
    /// Build a record with its checksum filled in.
    pub fn new(
        instance: InstanceId,
        state: DeploymentState,
        reason: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            instance,
            state,
            reason: reason.into(),
            metadata,
            checksum: String::new(),
            timestamp: Utc::now(),
        }
        .finalize()
    }

    /// Compute the checksum over the (state, metadata) tuple.
    ///
    /// `serde_json` maps are ordered, so serializing the metadata yields a
    /// stable byte sequence for equal values.
    pub fn calculate_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.state.to_string().as_bytes());
        let metadata = self.metadata.to_string();
        hasher.update((metadata.len() as u64).to_le_bytes());
        hasher.update(metadata.as_bytes());

        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
    }

    /// Verify the stored checksum against a recomputation.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }

    /// Return the record with its checksum calculated.
    pub fn finalize(mut self) -> Self {
        self.checksum = self.calculate_checksum();
        self
    }
}

/// Audit row recording a single state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransitionRecord {
    /// Instance the transition belongs to.
    pub instance: InstanceId,

    /// State before the transition.
    pub from_state: DeploymentState,

    /// State after the transition.
    pub to_state: DeploymentState,

    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_checksum_roundtrip() {
        let record = DeploymentStateRecord::new(
            InstanceId::new("tst"),
            DeploymentState::Complete,
            "deployment finished",
            json!({"services": 7}),
        );

        assert!(record.verify_checksum());
    }

    #[test]
    fn test_record_checksum_detects_metadata_tamper() {
        let mut record = DeploymentStateRecord::new(
            InstanceId::new("tst"),
            DeploymentState::Complete,
            "deployment finished",
            json!({"services": 7}),
        );

        // Label unchanged, metadata tampered
        record.metadata = json!({"services": 8});
        assert!(!record.verify_checksum());
    }

    #[test]
    fn test_record_checksum_detects_state_tamper() {
        let mut record = DeploymentStateRecord::new(
            InstanceId::new("tst"),
            DeploymentState::Complete,
            "deployment finished",
            json!({}),
        );

        record.state = DeploymentState::Failed;
        assert!(!record.verify_checksum());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DeploymentState::Deploying.to_string(), "deploying");
        assert_eq!(DeploymentState::RolledBack.to_string(), "rolled-back");
    }
}
