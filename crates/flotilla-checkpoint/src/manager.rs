//! Checkpoint manager - snapshot and restore configuration artifacts.

use std::sync::Arc;

use chrono::Utc;
use flotilla_types::{DeploymentState, InstanceId};
use tracing::{debug, info, instrument, warn};

use crate::artifact::{ArtifactLayout, ArtifactStore};
use crate::error::{CheckpointError, CheckpointId, Result};
use crate::record::{ArtifactSnapshot, CheckpointRecord};
use crate::store::CheckpointStore;

/// Suffix for staged files during a rollback.
const STAGE_SUFFIX: &str = ".restore-tmp";

/// Snapshots tracked configuration artifacts and restores them atomically.
pub struct CheckpointManager {
    artifacts: Arc<dyn ArtifactStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    layout: ArtifactLayout,
}

impl CheckpointManager {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        layout: ArtifactLayout,
    ) -> Self {
        Self {
            artifacts,
            checkpoints,
            layout,
        }
    }

    /// Snapshot every tracked artifact for `instance` into an immutable
    /// record and return its id. Fails without storing anything if any
    /// artifact is unreadable.
    #[instrument(skip(self, reason), fields(instance = %instance))]
    pub async fn create_checkpoint(
        &self,
        instance: &InstanceId,
        state_label: DeploymentState,
        reason: impl Into<String>,
    ) -> Result<CheckpointId> {
        let mut snapshots = Vec::new();
        for path in self.layout.tracked_paths(instance) {
            let contents = self.artifacts.read(&path).await.map_err(|e| {
                CheckpointError::ArtifactUnreadable {
                    instance: instance.clone(),
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            snapshots.push(ArtifactSnapshot { path, contents });
        }

        let record = CheckpointRecord {
            id: CheckpointId::generate(),
            instance: instance.clone(),
            state_label,
            reason: reason.into(),
            artifacts: snapshots,
            created_at: Utc::now(),
        };
        let id = record.id.clone();
        self.checkpoints.store(&record).await?;

        info!(checkpoint_id = %id, artifacts = record.artifacts.len(), "Checkpoint created");
        Ok(id)
    }

    /// Restore the artifacts captured in a checkpoint.
    ///
    /// Two phases: every snapshot is first written to a staging path; only
    /// when all writes succeed are the staged files renamed over the
    /// originals. A failure during staging removes the staged files and
    /// leaves the originals untouched.
    #[instrument(skip(self), fields(instance = %instance, checkpoint_id = %checkpoint_id))]
    pub async fn rollback(
        &self,
        instance: &InstanceId,
        checkpoint_id: &CheckpointId,
    ) -> Result<()> {
        let record = self
            .checkpoints
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.clone()))?;

        // Phase 1: stage.
        let mut staged = Vec::new();
        for snapshot in &record.artifacts {
            let stage_path = format!("{}{}", snapshot.path, STAGE_SUFFIX);
            if let Err(e) = self
                .artifacts
                .write(&stage_path, snapshot.contents.clone())
                .await
            {
                warn!(path = %stage_path, error = %e, "Staging failed, aborting rollback");
                self.discard_staged(&staged).await;
                return Err(CheckpointError::RollbackFailed {
                    instance: instance.clone(),
                    reason: format!("staging {} failed: {e}", snapshot.path),
                });
            }
            staged.push(stage_path);
        }

        // Phase 2: swap staged files into place.
        for snapshot in &record.artifacts {
            let stage_path = format!("{}{}", snapshot.path, STAGE_SUFFIX);
            self.artifacts
                .rename(&stage_path, &snapshot.path)
                .await
                .map_err(|e| CheckpointError::RollbackFailed {
                    instance: instance.clone(),
                    reason: format!("swapping {} failed: {e}", snapshot.path),
                })?;
        }

        info!(artifacts = record.artifacts.len(), "Rollback complete");
        Ok(())
    }

    /// All checkpoints for an instance, newest first.
    pub async fn list_checkpoints(&self, instance: &InstanceId) -> Result<Vec<CheckpointRecord>> {
        self.checkpoints.list(instance).await
    }

    /// Delete a checkpoint. Used by external retention tooling.
    pub async fn delete_checkpoint(&self, id: &CheckpointId) -> Result<()> {
        self.checkpoints.delete(id).await
    }

    async fn discard_staged(&self, staged: &[String]) {
        for path in staged {
            if let Err(e) = self.artifacts.remove(path).await {
                debug!(path = %path, error = %e, "Failed to remove staged file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use crate::store::InMemoryCheckpointStore;
    use async_trait::async_trait;
    use bytes::Bytes;

    fn seeded_manager() -> (CheckpointManager, Arc<InMemoryArtifactStore>) {
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let manager = CheckpointManager::new(
            artifacts.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            ArtifactLayout::default(),
        );
        (manager, artifacts)
    }

    async fn seed_artifacts(artifacts: &InMemoryArtifactStore, instance: &InstanceId) {
        for path in ArtifactLayout::default().tracked_paths(instance) {
            artifacts
                .write(&path, Bytes::from(format!("original contents of {path}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_checkpoint_then_mutate_then_rollback_roundtrip() {
        let (manager, artifacts) = seeded_manager();
        let instance = InstanceId::new("tst");
        seed_artifacts(&artifacts, &instance).await;

        let id = manager
            .create_checkpoint(&instance, DeploymentState::Complete, "pre-deployment")
            .await
            .unwrap();

        // Mutate every tracked artifact.
        let paths = ArtifactLayout::default().tracked_paths(&instance);
        for path in &paths {
            artifacts
                .write(path, Bytes::from_static(b"mutated"))
                .await
                .unwrap();
        }

        manager.rollback(&instance, &id).await.unwrap();

        // Byte-identical restoration.
        for path in &paths {
            let restored = artifacts.read(path).await.unwrap();
            assert_eq!(restored, Bytes::from(format!("original contents of {path}")));
        }
    }

    #[tokio::test]
    async fn test_checkpoint_fails_on_unreadable_artifact() {
        let (manager, artifacts) = seeded_manager();
        let instance = InstanceId::new("tst");
        seed_artifacts(&artifacts, &instance).await;

        // Remove one tracked artifact so the read fails.
        artifacts.remove("deployments/tst/config.yaml").await.unwrap();

        let result = manager
            .create_checkpoint(&instance, DeploymentState::Unknown, "pre-deployment")
            .await;
        assert!(matches!(
            result,
            Err(CheckpointError::ArtifactUnreadable { .. })
        ));
    }

    #[tokio::test]
    async fn test_rollback_unknown_id_is_distinct() {
        let (manager, _artifacts) = seeded_manager();
        let result = manager
            .rollback(&InstanceId::new("tst"), &CheckpointId::generate())
            .await;
        assert!(matches!(result, Err(CheckpointError::NotFound(_))));
    }

    /// Artifact store whose writes fail for one path; reads delegate.
    struct WriteFailingStore {
        inner: InMemoryArtifactStore,
        fail_on: String,
    }

    #[async_trait]
    impl ArtifactStore for WriteFailingStore {
        async fn read(&self, path: &str) -> Result<Bytes> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &str, contents: Bytes) -> Result<()> {
            if path.starts_with(&self.fail_on) {
                return Err(CheckpointError::Storage("disk full".to_string()));
            }
            self.inner.write(path, contents).await
        }

        async fn rename(&self, from: &str, to: &str) -> Result<()> {
            self.inner.rename(from, to).await
        }

        async fn remove(&self, path: &str) -> Result<()> {
            self.inner.remove(path).await
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path).await
        }
    }

    #[tokio::test]
    async fn test_failed_staging_leaves_originals_untouched() {
        let instance = InstanceId::new("tst");
        let inner = InMemoryArtifactStore::new();
        seed_artifacts(&inner, &instance).await;

        let store = Arc::new(WriteFailingStore {
            inner,
            // The last tracked artifact fails to stage.
            fail_on: "deployments/tst/docker-compose.yml".to_string(),
        });
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let manager =
            CheckpointManager::new(store.clone(), checkpoints, ArtifactLayout::default());

        let id = manager
            .create_checkpoint(&instance, DeploymentState::Complete, "pre-deployment")
            .await
            .unwrap();

        let result = manager.rollback(&instance, &id).await;
        assert!(matches!(
            result,
            Err(CheckpointError::RollbackFailed { .. })
        ));

        // Originals intact, no staged residue.
        for path in ArtifactLayout::default().tracked_paths(&instance) {
            let contents = store.read(&path).await.unwrap();
            assert_eq!(contents, Bytes::from(format!("original contents of {path}")));
            assert!(!store.exists(&format!("{path}{STAGE_SUFFIX}")).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (manager, artifacts) = seeded_manager();
        let instance = InstanceId::new("tst");
        seed_artifacts(&artifacts, &instance).await;

        let id = manager
            .create_checkpoint(&instance, DeploymentState::Complete, "first")
            .await
            .unwrap();
        manager
            .create_checkpoint(&instance, DeploymentState::Complete, "second")
            .await
            .unwrap();

        assert_eq!(manager.list_checkpoints(&instance).await.unwrap().len(), 2);

        manager.delete_checkpoint(&id).await.unwrap();
        assert_eq!(manager.list_checkpoints(&instance).await.unwrap().len(), 1);
    }
}
