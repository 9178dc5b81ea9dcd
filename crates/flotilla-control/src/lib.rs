//! # FLOTILLA Control Plane
//!
//! Unified facade over the FLOTILLA orchestration subsystems: the
//! dependency-graph scheduler, the durable circuit breakers, the
//! checkpoint/rollback manager, the state consistency engine, and the
//! deployment lock manager.
//!
//! ## Overview
//!
//! The [`ControlPlane`] is the single entry point a CLI, scheduler daemon,
//! or test harness builds on. A deployment for instance X:
//!
//! 1. acquires the lock for X (bounded wait)
//! 2. takes a checkpoint of X's configuration artifacts
//! 3. walks the dependency graph level by level, launching the services
//!    of each level in parallel, each launch wrapped in its circuit
//!    breaker and bounded by its dynamic timeout
//! 4. classifies failures: transient ones retry with backoff, recoverable
//!    ones go through auto-recovery, permanent and unknown ones surface
//! 5. records state transitions through the consistency engine (durable
//!    side first) and finally releases the lock
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flotilla_control::{ControlPlaneBuilder, MockServiceLauncher, RequestContext};
//! use flotilla_types::InstanceId;
//!
//! # async fn example() {
//! let control_plane = ControlPlaneBuilder::new()
//!     .with_launcher(Arc::new(MockServiceLauncher::new()))
//!     .build()
//!     .expect("control plane");
//!
//! let ctx = RequestContext::default();
//! let report = control_plane
//!     .deploy(&InstanceId::new("tst"), &ctx)
//!     .await
//!     .unwrap();
//! println!("started {} services", report.services_started.len());
//! # }
//! ```
//!
//! ## Event Stream
//!
//! Every significant step (deployment started, checkpoint created,
//! service launched, breaker blocked, rolled back, completed/failed) is
//! published on a broadcast stream:
//!
//! ```rust,no_run
//! # use flotilla_control::ControlPlane;
//! # fn example(cp: &ControlPlane) {
//! let mut events = cp.subscribe_events();
//! // Use events in a loop
//! # }
//! ```

#![deny(unsafe_code)]

pub mod builder;
pub mod context;
pub mod control_plane;
pub mod error;
pub mod events;
pub mod launcher;

// Re-exports
pub use builder::ControlPlaneBuilder;
pub use context::{Actor, RequestContext};
pub use control_plane::{
    ControlPlane, ControlPlaneConfig, DeploymentReport, InstanceStatus, VerifyReport,
};
pub use error::{ControlPlaneError, Result};
pub use events::OrchestrationEvent;
pub use launcher::{LaunchFailure, MockServiceLauncher, ServiceLauncher};
