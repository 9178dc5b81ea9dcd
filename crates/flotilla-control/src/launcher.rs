//! Service launcher seam.
//!
//! Actually starting a workload (compose service, VM, container) is an
//! external collaborator's job. The control plane decides *whether* and
//! *when* a launch should be attempted and records its outcome; the
//! launcher performs it.

use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::{ErrorCode, InstanceId, ServiceName};
use std::sync::Mutex;
use thiserror::Error;

/// A failed launch attempt, carrying the code the error classifier maps
/// to a severity class.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct LaunchFailure {
    /// Machine-readable error code.
    pub code: ErrorCode,

    /// Human-readable message.
    pub message: String,
}

impl LaunchFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::new(code),
            message: message.into(),
        }
    }
}

/// Starts one service of an instance and waits for it to become ready.
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    async fn launch(
        &self,
        instance: &InstanceId,
        service: &ServiceName,
    ) -> std::result::Result<(), LaunchFailure>;
}

struct FailurePlan {
    code: String,
    message: String,
    remaining: u32,
}

/// Scriptable launcher for tests.
///
/// Succeeds by default; individual services can be told to fail a number
/// of times (or always) with a given error code. Records every successful
/// launch in order.
#[derive(Default)]
pub struct MockServiceLauncher {
    launched: Mutex<Vec<ServiceName>>,
    attempts: DashMap<ServiceName, u32>,
    failures: DashMap<ServiceName, FailurePlan>,
}

impl MockServiceLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` launches of `service` with `code`.
    pub fn fail_times(self, service: &str, code: &str, times: u32) -> Self {
        self.failures.insert(
            ServiceName::new(service),
            FailurePlan {
                code: code.to_string(),
                message: format!("{service} failed to start"),
                remaining: times,
            },
        );
        self
    }

    /// Fail every launch of `service` with `code`.
    pub fn always_fail(self, service: &str, code: &str) -> Self {
        self.fail_times(service, code, u32::MAX)
    }

    /// Services launched successfully, in order.
    pub fn launch_order(&self) -> Vec<ServiceName> {
        self.launched.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Total launch attempts (successes and failures) for a service.
    pub fn attempts_for(&self, service: &str) -> u32 {
        self.attempts
            .get(&ServiceName::new(service))
            .map(|n| *n)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ServiceLauncher for MockServiceLauncher {
    async fn launch(
        &self,
        _instance: &InstanceId,
        service: &ServiceName,
    ) -> std::result::Result<(), LaunchFailure> {
        *self.attempts.entry(service.clone()).or_insert(0) += 1;

        if let Some(mut plan) = self.failures.get_mut(service) {
            if plan.remaining > 0 {
                if plan.remaining != u32::MAX {
                    plan.remaining -= 1;
                }
                return Err(LaunchFailure::new(plan.code.clone(), plan.message.clone()));
            }
        }

        if let Ok(mut launched) = self.launched.lock() {
            launched.push(service.clone());
        }
        Ok(())
    }
}
