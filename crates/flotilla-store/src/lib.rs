//! FLOTILLA Store - Durable storage abstractions for orchestration state
//!
//! Every piece of orchestration state that must survive a process crash
//! goes through the traits in this crate: deployment-state history,
//! circuit-breaker rows, the error log, metrics, the consistency-check
//! log, and lock leases.
//!
//! Multiple independent processes (CLI invocations, background
//! reconciliation jobs) share one durable store; correctness rests on the
//! store's atomic single-record operations rather than on any in-process
//! coordination. The two atomic primitives are:
//!
//! - [`BreakerStore::compare_and_swap`]: versioned update of a breaker row,
//!   so racing processes cannot both win a state transition
//! - [`LockStore::try_acquire`]: atomic grant of a TTL lease, so at most
//!   one live lock exists per instance
//!
//! [`InMemoryStore`] implements every trait for tests and single-process
//! use; production backends implement the same traits over a database.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use traits::{
    AcquireOutcome, BreakerStore, ConsistencyLogStore, ErrorStore, LockStore, MetricsStore,
    ReleaseOutcome, StateStore,
};
