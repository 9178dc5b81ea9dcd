//! Checkpoint record storage.

use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::InstanceId;

use crate::error::{CheckpointId, Result};
use crate::record::CheckpointRecord;

/// Storage backend for checkpoint records.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a record.
    async fn store(&self, record: &CheckpointRecord) -> Result<()>;

    /// Load a record by ID.
    async fn load(&self, id: &CheckpointId) -> Result<Option<CheckpointRecord>>;

    /// All records for an instance, newest first.
    async fn list(&self, instance: &InstanceId) -> Result<Vec<CheckpointRecord>>;

    /// Delete a record. Retention tooling only.
    async fn delete(&self, id: &CheckpointId) -> Result<()>;
}

/// In-memory checkpoint storage.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    records: DashMap<CheckpointId, CheckpointRecord>,
    by_instance: DashMap<InstanceId, Vec<CheckpointId>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn store(&self, record: &CheckpointRecord) -> Result<()> {
        self.records.insert(record.id.clone(), record.clone());
        self.by_instance
            .entry(record.instance.clone())
            .or_default()
            .push(record.id.clone());
        Ok(())
    }

    async fn load(&self, id: &CheckpointId) -> Result<Option<CheckpointRecord>> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn list(&self, instance: &InstanceId) -> Result<Vec<CheckpointRecord>> {
        let ids = self
            .by_instance
            .get(instance)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let mut records: Vec<CheckpointRecord> = ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.clone()))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn delete(&self, id: &CheckpointId) -> Result<()> {
        if let Some((_, record)) = self.records.remove(id) {
            if let Some(mut ids) = self.by_instance.get_mut(&record.instance) {
                ids.retain(|i| i != id);
            }
        }
        Ok(())
    }
}
