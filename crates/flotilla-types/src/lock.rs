//! Deployment lock lease.
//!
//! At most one live lease exists per instance. Leases carry a TTL so a
//! lock held by a crashed process expires instead of requiring manual
//! cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, LockToken};

/// Exclusive deployment lock on one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockLease {
    /// Instance the lease covers.
    pub instance: InstanceId,

    /// Token identifying the holder.
    pub holder: LockToken,

    /// When the lease was acquired.
    pub acquired_at: DateTime<Utc>,

    /// When the lease expires if not released.
    pub expires_at: DateTime<Utc>,
}

impl LockLease {
    /// Whether the lease has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lease_expiry() {
        let now = Utc::now();
        let lease = LockLease {
            instance: InstanceId::new("tst"),
            holder: LockToken::generate(),
            acquired_at: now,
            expires_at: now + Duration::seconds(60),
        };

        assert!(!lease.is_expired(now));
        assert!(lease.is_expired(now + Duration::seconds(61)));
    }
}
