//! Metric samples and consistency-check log rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;

/// One orchestration metric sample.
///
/// Startup durations feed dynamic timeout calculation; `auto_recovery.*`
/// samples record every remediation attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Instance the sample belongs to.
    pub instance: InstanceId,

    /// Metric name, e.g. `startup_duration.keycloak`.
    pub name: String,

    /// Sample value.
    pub value: f64,

    /// When the sample was recorded.
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(instance: InstanceId, name: impl Into<String>, value: f64) -> Self {
        Self {
            instance,
            name: name.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Verdict of a consistency check between mirror and authoritative store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyVerdict {
    /// Both sides agree (or neither has a record).
    Consistent,

    /// The sides diverge: one missing, or labels differ.
    Inconsistent,
}

/// Action taken by a consistency check or reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyAction {
    /// Nothing needed doing.
    None,

    /// The local mirror was rewritten from the authoritative record.
    MirrorRewritten,

    /// The local mirror was created from the authoritative record.
    MirrorCreated,

    /// A local-only record was promoted into the authoritative store.
    PromotedLocal,

    /// The mirror was newer than the authoritative record and left alone.
    SkippedNewerMirror,
}

impl std::fmt::Display for ConsistencyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyAction::None => write!(f, "none"),
            ConsistencyAction::MirrorRewritten => write!(f, "mirror-rewritten"),
            ConsistencyAction::MirrorCreated => write!(f, "mirror-created"),
            ConsistencyAction::PromotedLocal => write!(f, "promoted-local"),
            ConsistencyAction::SkippedNewerMirror => write!(f, "skipped-newer-mirror"),
        }
    }
}

/// One row of the consistency-check log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyCheckRecord {
    /// Instance that was checked.
    pub instance: InstanceId,

    /// Verdict of the check.
    pub verdict: ConsistencyVerdict,

    /// Action taken, if any.
    pub action: ConsistencyAction,

    /// When the check ran.
    pub timestamp: DateTime<Utc>,
}
