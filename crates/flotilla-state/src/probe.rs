//! Runtime probe seam.
//!
//! When no state record exists at all (e.g. after an external wipe), the
//! consistency engine can inspect the running system through this trait
//! and seed a best-effort state instead of leaving it undefined.

use async_trait::async_trait;
use flotilla_types::{InstanceId, ServiceName};

/// Inspects the running system for liveness facts.
#[async_trait]
pub trait RuntimeProbe: Send + Sync {
    /// Names of components currently running for the instance.
    async fn running_components(
        &self,
        instance: &InstanceId,
    ) -> std::result::Result<Vec<ServiceName>, String>;
}

/// Probe returning a fixed component list. For tests.
pub struct FixedRuntimeProbe {
    components: Vec<ServiceName>,
}

impl FixedRuntimeProbe {
    pub fn running(components: &[&str]) -> Self {
        Self {
            components: components.iter().map(|c| ServiceName::new(*c)).collect(),
        }
    }

    pub fn nothing_running() -> Self {
        Self {
            components: Vec::new(),
        }
    }
}

#[async_trait]
impl RuntimeProbe for FixedRuntimeProbe {
    async fn running_components(
        &self,
        _instance: &InstanceId,
    ) -> std::result::Result<Vec<ServiceName>, String> {
        Ok(self.components.clone())
    }
}
