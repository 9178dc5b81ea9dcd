//! Local state mirror.
//!
//! The read-through cache side of the dual store. The mirror also holds
//! local-only residue markers (scheduled-cleanup sentinels and the like)
//! that [`crate::StateConsistencyEngine::cleanup_stale`] garbage-collects;
//! authoritative history is never touched by that path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flotilla_types::{DeploymentStateRecord, InstanceId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A local-only residue marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleMarker {
    /// Instance the marker belongs to.
    pub instance: InstanceId,

    /// Marker name, e.g. `cleanup-scheduled`.
    pub name: String,

    /// When the marker was written.
    pub created_at: DateTime<Utc>,
}

/// The fast local copy of deployment state.
#[async_trait]
pub trait StateMirror: Send + Sync {
    /// Current mirrored record for an instance.
    async fn read(&self, instance: &InstanceId) -> Result<Option<DeploymentStateRecord>>;

    /// Write or replace the mirrored record.
    async fn write(&self, record: &DeploymentStateRecord) -> Result<()>;

    /// Drop the mirrored record.
    async fn remove(&self, instance: &InstanceId) -> Result<()>;

    /// Write a residue marker.
    async fn set_marker(&self, marker: &StaleMarker) -> Result<()>;

    /// All residue markers.
    async fn markers(&self) -> Result<Vec<StaleMarker>>;

    /// Remove a residue marker.
    async fn remove_marker(&self, instance: &InstanceId, name: &str) -> Result<()>;
}

/// In-memory mirror for tests and single-process use.
#[derive(Default)]
pub struct InMemoryStateMirror {
    records: DashMap<InstanceId, DeploymentStateRecord>,
    markers: DashMap<(InstanceId, String), StaleMarker>,
}

impl InMemoryStateMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateMirror for InMemoryStateMirror {
    async fn read(&self, instance: &InstanceId) -> Result<Option<DeploymentStateRecord>> {
        Ok(self.records.get(instance).map(|r| r.clone()))
    }

    async fn write(&self, record: &DeploymentStateRecord) -> Result<()> {
        self.records.insert(record.instance.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, instance: &InstanceId) -> Result<()> {
        self.records.remove(instance);
        Ok(())
    }

    async fn set_marker(&self, marker: &StaleMarker) -> Result<()> {
        self.markers.insert(
            (marker.instance.clone(), marker.name.clone()),
            marker.clone(),
        );
        Ok(())
    }

    async fn markers(&self) -> Result<Vec<StaleMarker>> {
        Ok(self.markers.iter().map(|m| m.clone()).collect())
    }

    async fn remove_marker(&self, instance: &InstanceId, name: &str) -> Result<()> {
        self.markers.remove(&(instance.clone(), name.to_string()));
        Ok(())
    }
}
