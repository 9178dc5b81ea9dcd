//! Error types for graph construction and queries.

use flotilla_types::ServiceName;
use thiserror::Error;

/// Errors from graph validation and scheduling.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// The dependency relation contains a cycle. The path is the DFS
    /// recursion-stack suffix starting and ending at the repeated node.
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// The offending cycle, first node repeated at the end.
        cycle: Vec<ServiceName>,
    },

    /// A service names a dependency that is not declared in the graph.
    #[error("service {service} depends on undeclared service {dependency}")]
    UnknownDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    /// A service name appears more than once in the configuration.
    #[error("service {0} is declared more than once")]
    DuplicateService(ServiceName),

    /// A queried service is not part of the graph.
    #[error("unknown service: {0}")]
    UnknownService(ServiceName),

    /// A service's timeout bounds are inverted or empty.
    #[error("service {service} has invalid timeout bounds (min > max)")]
    InvalidTimeoutBounds { service: ServiceName },
}

fn format_cycle(cycle: &[ServiceName]) -> String {
    cycle
        .iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
