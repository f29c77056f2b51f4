use crate::{
    config::LeaseConfig,
    lease::Lease,
    message::{Accepted, AcquireRequest, ReleaseRequest, RenewRequest},
    time::{deadline, Clock},
    Context, Error, Result, TenantId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// In-memory table of leases, `tenant -> key -> lease`.
///
/// One mutex serializes every operation across all tenants. Acquire drops it
/// between contended attempts. Expired entries are not swept; the next
/// acquire for the key overwrites them.
#[derive(Debug)]
pub struct LeaseStore {
    clock: Arc<Clock>,
    config: LeaseConfig,
    leases: Mutex<HashMap<TenantId, HashMap<String, Lease>>>,
}

impl LeaseStore {
    pub fn new(clock: Arc<Clock>, config: LeaseConfig) -> Self {
        Self {
            clock,
            config,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Grant `req.key` to `req.id`, retrying with exponential backoff while a
    /// live lease holds it.
    pub async fn acquire(&self, ctx: &Context, req: AcquireRequest) -> Result<Lease> {
        if req.key.is_empty() {
            return Err(Error::InvalidArgument("lease key must not be empty".into()));
        }
        if req.ttl.is_zero() {
            return Err(Error::InvalidArgument("lease TTL must be positive".into()));
        }
        let max_attempts = req.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            if let Some(lease) = self.try_install(&req) {
                debug!(
                    tenant = %lease.tenant_id,
                    key = %lease.key,
                    lease_id = %lease.id,
                    attempt = attempt + 1,
                    "lease granted"
                );
                return Ok(lease);
            }

            attempt += 1;
            if attempt >= max_attempts {
                warn!(tenant = %req.tenant_id, key = %req.key, attempts = attempt, "lease still held");
                return Err(Error::LeaseHeld {
                    key: req.key,
                    attempts: attempt,
                });
            }

            let backoff = self.config.backoff(attempt);
            debug!(tenant = %req.tenant_id, key = %req.key, attempt, ?backoff, "lease contended, backing off");
            tokio::select! {
                () = ctx.cancelled() => return Err(Error::Canceled),
                () = tokio::time::sleep(backoff) => {}
            }
        }
    }

    fn try_install(&self, req: &AcquireRequest) -> Option<Lease> {
        let mut leases = self.leases.lock();
        let now = self.clock.now();
        let tenant = leases.entry(req.tenant_id).or_default();

        if tenant.get(&req.key).is_some_and(|existing| !existing.is_expired(now)) {
            return None;
        }

        let lease = Lease::new(req.id, req.tenant_id, req.key.clone(), req.ttl, now);
        tenant.insert(req.key.clone(), lease.clone());
        Some(lease)
    }

    /// Push the expiry of a live lease owned by `req.id` to `now + req.ttl`.
    pub fn renew(&self, req: &RenewRequest) -> Result<Accepted> {
        let mut leases = self.leases.lock();
        let now = self.clock.now();

        let tenant = leases
            .get_mut(&req.tenant_id)
            .ok_or(Error::NoSuchTenant { tenant: req.tenant_id })?;
        let lease = tenant.get_mut(&req.key).ok_or_else(|| Error::NoSuchLease {
            key: req.key.clone(),
        })?;

        if lease.id != req.id {
            return Err(Error::OwnershipMismatch { key: req.key.clone() });
        }
        if lease.is_expired(now) {
            return Err(Error::LeaseExpired { key: req.key.clone() });
        }

        lease.expire_at = deadline(now, req.ttl);
        debug!(tenant = %req.tenant_id, key = %req.key, lease_id = %req.id, expire_at = %lease.expire_at, "lease renewed");
        Ok(Accepted)
    }

    /// Remove the lease if `req.id` owns it. Never fails: a missing lease or
    /// a foreign owner leaves the table untouched.
    pub fn release(&self, req: &ReleaseRequest) -> Accepted {
        let mut leases = self.leases.lock();

        let Some(tenant) = leases.get_mut(&req.tenant_id) else {
            return Accepted;
        };
        match tenant.get(&req.key).map(|lease| lease.id) {
            Some(holder) if holder == req.id => {
                tenant.remove(&req.key);
                debug!(tenant = %req.tenant_id, key = %req.key, lease_id = %req.id, "lease released");
            }
            Some(holder) => {
                debug!(
                    tenant = %req.tenant_id,
                    key = %req.key,
                    %holder,
                    caller = %req.id,
                    "release by non-owner ignored"
                );
            }
            None => {}
        }
        Accepted
    }

    /// Snapshot of the record for `key`, expired or not.
    pub fn get(&self, tenant_id: TenantId, key: &str) -> Option<Lease> {
        self.leases.lock().get(&tenant_id).and_then(|t| t.get(key)).cloned()
    }

    /// Number of unexpired leases across all tenants.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.leases
            .lock()
            .values()
            .flat_map(HashMap::values)
            .filter(|lease| !lease.is_expired(now))
            .count()
    }
}
