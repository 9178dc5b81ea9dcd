//! Blob-store abstraction for configuration artifacts.
//!
//! The checkpoint manager reads and restores artifacts through
//! [`ArtifactStore`]; the filesystem backend serves production, the
//! in-memory backend serves tests.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use flotilla_types::InstanceId;
use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};

/// Which artifacts are tracked per instance and where they live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Root prefix under which instance directories live.
    pub root: String,

    /// File names tracked for every instance.
    pub tracked_files: Vec<String>,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            root: "deployments".to_string(),
            tracked_files: vec![
                ".env".to_string(),
                "config.yaml".to_string(),
                "docker-compose.yml".to_string(),
            ],
        }
    }
}

impl ArtifactLayout {
    /// Tracked artifact paths for an instance, in configuration order.
    pub fn tracked_paths(&self, instance: &InstanceId) -> Vec<String> {
        self.tracked_files
            .iter()
            .map(|file| format!("{}/{}/{}", self.root, instance, file))
            .collect()
    }
}

/// Key/value blob store for configuration artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read an artifact's contents. Missing or unreadable paths error.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write an artifact, replacing any previous contents.
    async fn write(&self, path: &str, contents: Bytes) -> Result<()>;

    /// Atomically move an artifact from one path to another.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Remove an artifact if present.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Whether an artifact exists.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// In-memory artifact store for tests.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: DashMap<String, Bytes>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.blobs
            .get(path)
            .map(|b| b.clone())
            .ok_or_else(|| CheckpointError::Storage(format!("no such artifact: {path}")))
    }

    async fn write(&self, path: &str, contents: Bytes) -> Result<()> {
        self.blobs.insert(path.to_string(), contents);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (_, contents) = self
            .blobs
            .remove(from)
            .ok_or_else(|| CheckpointError::Storage(format!("no such artifact: {from}")))?;
        self.blobs.insert(to.to_string(), contents);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.blobs.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(path))
    }
}

/// Filesystem-backed artifact store rooted at a directory.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path);
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| CheckpointError::Storage(format!("read {}: {e}", full.display())))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, contents: Bytes) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CheckpointError::Storage(format!("mkdir {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&full, &contents)
            .await
            .map_err(|e| CheckpointError::Storage(format!("write {}: {e}", full.display())))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from_full, to_full) = (self.resolve(from), self.resolve(to));
        tokio::fs::rename(&from_full, &to_full).await.map_err(|e| {
            CheckpointError::Storage(format!(
                "rename {} -> {}: {e}",
                from_full.display(),
                to_full.display()
            ))
        })
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::Storage(format!(
                "remove {}: {e}",
                full.display()
            ))),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false))
    }
}
