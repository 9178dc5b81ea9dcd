//! Error taxonomy and classification.
//!
//! Every orchestration failure carries an [`ErrorCode`]; [`classify`] maps
//! a code to its [`ErrorClass`], which drives the propagation policy:
//! transient failures are retried with backoff, recoverable failures are
//! routed to auto-recovery, permanent and unknown failures surface to the
//! operator immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::InstanceId;

/// Severity class of an orchestration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Expected to resolve without intervention; retry with backoff.
    Transient,

    /// Will not resolve by retrying; stop and surface to an operator.
    Permanent,

    /// Resolvable by a known automated procedure.
    Recoverable,

    /// Unclassified; treated conservatively as non-retryable.
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::Recoverable => write!(f, "recoverable"),
            ErrorClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Machine-readable error code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(String);

impl ErrorCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classify an error code into its severity class.
///
/// Pure function; the table covers the codes the platform's collaborators
/// emit. Unlisted codes are [`ErrorClass::Unknown`].
pub fn classify(code: &ErrorCode) -> ErrorClass {
    match code.as_str() {
        // Resolve on their own; worth retrying.
        "network_timeout" | "startup_timeout" | "service_unavailable" | "connection_refused"
        | "health_check_pending" => ErrorClass::Transient,

        // A registered remediation procedure exists for these.
        "container_exited" | "database_connection_lost" | "credential_expired"
        | "cache_corrupted" => ErrorClass::Recoverable,

        // Retrying cannot help.
        "config_invalid" | "image_missing" | "disk_full" | "dependency_cycle"
        | "unsupported_platform" => ErrorClass::Permanent,

        _ => ErrorClass::Unknown,
    }
}

/// One row of the append-only orchestration error log.
///
/// Recovery success does not erase the record; the log is the audit trail
/// the failure-threshold policy reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Instance the error occurred on.
    pub instance: InstanceId,

    /// Machine-readable code.
    pub code: ErrorCode,

    /// Severity class derived from the code.
    pub class: ErrorClass,

    /// Component that produced the error.
    pub source: String,

    /// Human-readable message.
    pub message: String,

    /// Suggested remediation for the operator.
    pub remediation: Option<String>,

    /// Structured context captured at failure time.
    pub context: Value,

    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// Build a record, deriving the class from the code.
    pub fn new(
        instance: InstanceId,
        code: ErrorCode,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let class = classify(&code);
        Self {
            instance,
            code,
            class,
            source: source.into(),
            message: message.into(),
            remediation: None,
            context: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_codes() {
        assert_eq!(
            classify(&ErrorCode::new("network_timeout")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&ErrorCode::new("container_exited")),
            ErrorClass::Recoverable
        );
        assert_eq!(
            classify(&ErrorCode::new("config_invalid")),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_classify_unknown_code() {
        assert_eq!(
            classify(&ErrorCode::new("something_new")),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn test_error_record_derives_class() {
        let record = ErrorRecord::new(
            InstanceId::new("tst"),
            ErrorCode::new("database_connection_lost"),
            "launcher",
            "postgres connection dropped during startup",
        );
        assert_eq!(record.class, ErrorClass::Recoverable);
    }
}
