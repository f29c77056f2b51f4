use crate::{time::Timestamp, LeaseId, TenantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ownership of `key` within `tenant_id` until `expire_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Minted by the acquirer, never reassigned by the store
    pub id: LeaseId,

    pub tenant_id: TenantId,

    /// Contended resource name, unique within a tenant
    pub key: String,

    /// Validity requested at acquire time; renewals reuse it
    pub ttl: Duration,

    /// After this instant the lease is free for any acquirer
    pub expire_at: Timestamp,
}

impl Lease {
    pub fn new(id: LeaseId, tenant_id: TenantId, key: String, ttl: Duration, now: Timestamp) -> Self {
        Self {
            id,
            tenant_id,
            key,
            ttl,
            expire_at: crate::time::deadline(now, ttl),
        }
    }

    /// Check if the lease has expired at the given time
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expire_at < now
    }

    /// Time remaining until expiration
    pub fn time_remaining(&self, now: Timestamp) -> Option<Duration> {
        (self.expire_at - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Push expiry to `now + ttl`.
    pub fn extend(&mut self, now: Timestamp) {
        self.expire_at = crate::time::deadline(now, self.ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(ms: i64) -> Timestamp {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn test_lease_expiration() {
        let lease = Lease::new(
            LeaseId::new(),
            TenantId::new(),
            "job-42".to_string(),
            Duration::from_secs(30),
            at(1_000),
        );

        assert!(!lease.is_expired(at(1_000)));
        assert!(!lease.is_expired(at(30_999)));
        assert!(!lease.is_expired(at(31_000)));
        assert!(lease.is_expired(at(31_001)));
    }

    #[test]
    fn test_time_remaining() {
        let lease = Lease::new(
            LeaseId::new(),
            TenantId::new(),
            "job-42".to_string(),
            Duration::from_secs(30),
            at(1_000),
        );

        assert_eq!(lease.time_remaining(at(26_000)), Some(Duration::from_secs(5)));
        assert_eq!(lease.time_remaining(at(31_000)), None);
        assert_eq!(lease.time_remaining(at(40_000)), None);
    }

    #[test]
    fn test_lease_extend() {
        let mut lease = Lease::new(
            LeaseId::new(),
            TenantId::new(),
            "job-42".to_string(),
            Duration::from_secs(30),
            at(1_000),
        );
        let id = lease.id;

        // Renew at 26 seconds
        lease.extend(at(26_000));

        assert_eq!(lease.expire_at, at(56_000));
        assert_eq!(lease.id, id);
    }
}
