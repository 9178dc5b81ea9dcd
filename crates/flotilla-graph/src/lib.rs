//! FLOTILLA Graph - Service dependency graph and startup scheduling
//!
//! Holds the static service-dependency graph of an instance's stack,
//! validates it (unknown dependencies, cycles) at construction time,
//! computes topological startup levels, and derives per-service dynamic
//! timeouts from historical run durations.
//!
//! The graph is an explicit, constructible value: tests build a fresh
//! [`ServiceGraph`] from a [`ServiceGraphConfig`] instead of mutating
//! shared state. Validation happens once, eagerly; runtime traversal never
//! re-checks for cycles.
//!
//! ## Example
//!
//! ```rust
//! use flotilla_graph::{ServiceGraph, ServiceGraphConfig, ServiceSpec};
//! use flotilla_types::ServiceName;
//!
//! let config = ServiceGraphConfig {
//!     services: vec![
//!         ServiceSpec::new("postgres", &[]),
//!         ServiceSpec::new("keycloak", &["postgres"]),
//!         ServiceSpec::new("backend", &["keycloak"]),
//!     ],
//! };
//!
//! let graph = ServiceGraph::from_config(config).unwrap();
//! assert_eq!(graph.level(&ServiceName::new("backend")), Some(2));
//! assert_eq!(graph.max_level(), 2);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod graph;
pub mod timeout;

pub use config::{ServiceGraphConfig, ServiceSpec, TimeoutBounds};
pub use error::{GraphError, Result};
pub use graph::{ServiceGraph, StartupLevel};
pub use timeout::DurationHistory;
