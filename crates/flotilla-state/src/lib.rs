//! FLOTILLA State - Dual-store consistency and deployment locking
//!
//! Deployment state lives in two places: the durable authoritative store
//! (the single source of truth) and a fast local mirror. This crate keeps
//! the two in agreement:
//!
//! - [`StateConsistencyEngine`]: dual writes (durable side first),
//!   divergence detection, reconciliation toward the authoritative side,
//!   checksum validation, runtime inference, stale-marker cleanup
//! - [`DeploymentLockManager`]: bounded-wait, TTL-leased mutual exclusion
//!   per instance, so concurrent workflows never mutate the same instance
//!
//! ## Reconciliation rules
//!
//! - Authoritative record exists: the mirror is (re)written to match it,
//!   unless the mirror is strictly newer (an in-flight write from a live
//!   deployment is never downgraded by a background reconciler)
//! - Only the mirror exists: it is promoted into the authoritative store,
//!   so a crash between the two halves of a dual write loses no progress
//! - Neither exists: nothing to do
//!
//! A checksum mismatch is corruption, not divergence, and is surfaced as
//! an error instead of being auto-fixed.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod lock;
pub mod mirror;
pub mod probe;

pub use engine::{ConsistencyReport, StateConsistencyEngine};
pub use error::{LockError, Result, StateError};
pub use lock::{DeploymentLockManager, LockConfig};
pub use mirror::{InMemoryStateMirror, StaleMarker, StateMirror};
pub use probe::{FixedRuntimeProbe, RuntimeProbe};
