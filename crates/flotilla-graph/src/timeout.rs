//! Historical-duration source for dynamic timeout calculation.

use async_trait::async_trait;
use flotilla_types::ServiceName;

/// Source of recent startup durations (seconds) for a service.
///
/// Backed by the orchestration metrics store in production; tests use
/// [`FixedDurationHistory`].
#[async_trait]
pub trait DurationHistory: Send + Sync {
    /// Recent run durations for a service, in seconds. Order is not
    /// significant; an empty result means no history.
    async fn recent_durations(&self, service: &ServiceName) -> Vec<f64>;
}

/// History returning the same samples for every service.
pub struct FixedDurationHistory {
    samples: Vec<f64>,
}

impl FixedDurationHistory {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn empty() -> Self {
        Self { samples: Vec::new() }
    }
}

#[async_trait]
impl DurationHistory for FixedDurationHistory {
    async fn recent_durations(&self, _service: &ServiceName) -> Vec<f64> {
        self.samples.clone()
    }
}
