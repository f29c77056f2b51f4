use crate::{
    config::LeaseConfig,
    lease::Lease,
    message::{AcquireRequest, LeaseRoutes, ReleaseRequest, RenewRequest, Request},
    time::Clock,
    transport::{send_request, Transport},
    Context, Error, LeaseId, Result, TenantId,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait LeaseClient: Send + Sync {
    /// Acquire `key` for `ttl`, letting the store retry up to `max_attempts`
    /// times while another owner holds it.
    async fn acquire(
        &self,
        ctx: &Context,
        tenant_id: TenantId,
        key: &str,
        ttl: Duration,
        max_attempts: u32,
    ) -> Result<Lease>;

    /// Extend `lease` by its TTL. On success the local `expire_at` mirrors
    /// the store's.
    async fn renew(&self, ctx: &Context, lease: &mut Lease) -> Result<()>;

    async fn release(&self, ctx: &Context, lease: &Lease) -> Result<()>;
}

/// One bounded round trip per call, never retried. Transport failures,
/// timeouts included, come back unchanged.
#[derive(Debug, Clone)]
pub struct RemoteLeaseClient {
    transport: Arc<dyn Transport>,
    routes: LeaseRoutes,
    clock: Arc<Clock>,
    request_timeout: Duration,
}

impl RemoteLeaseClient {
    pub fn new(transport: Arc<dyn Transport>, routes: LeaseRoutes, clock: Arc<Clock>, config: &LeaseConfig) -> Self {
        Self {
            transport,
            routes,
            clock,
            request_timeout: config.request_timeout,
        }
    }

    async fn call<R: Request>(&self, ctx: &Context, request: &R) -> Result<R::Response> {
        let route = request.route(&self.routes);
        send_request(self.transport.as_ref(), ctx, &route, request, self.request_timeout).await
    }
}

#[async_trait]
impl LeaseClient for RemoteLeaseClient {
    async fn acquire(
        &self,
        ctx: &Context,
        tenant_id: TenantId,
        key: &str,
        ttl: Duration,
        max_attempts: u32,
    ) -> Result<Lease> {
        if key.is_empty() || ttl.is_zero() {
            return Err(Error::InvalidArgument(format!("invalid lease key {key:?} or TTL {ttl:?}")));
        }

        let request = AcquireRequest {
            id: LeaseId::new(),
            tenant_id,
            key: key.to_string(),
            ttl,
            max_attempts,
        };
        self.call(ctx, &request).await
    }

    async fn renew(&self, ctx: &Context, lease: &mut Lease) -> Result<()> {
        if lease.ttl.is_zero() {
            return Err(Error::InvalidArgument(format!("invalid lease TTL {:?}", lease.ttl)));
        }
        // No round trip for a lease we already know is dead.
        if lease.is_expired(self.clock.now()) {
            return Err(Error::LeaseExpired { key: lease.key.clone() });
        }

        self.call(ctx, &RenewRequest::from(&*lease)).await?;

        lease.extend(self.clock.now());
        debug!(key = %lease.key, lease_id = %lease.id, expire_at = %lease.expire_at, "renewed");
        Ok(())
    }

    async fn release(&self, ctx: &Context, lease: &Lease) -> Result<()> {
        self.call(ctx, &ReleaseRequest::from(lease)).await.map(|_| ())
    }
}
