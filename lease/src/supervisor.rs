use crate::{client::LeaseClient, lease::Lease, Context, Error};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Renewals per TTL. Leaves two more attempts before expiry if one is late.
pub const RENEWALS_PER_TTL: u32 = 3;

pub fn renew_interval(ttl: Duration) -> Duration {
    (ttl / RENEWALS_PER_TTL).max(Duration::from_millis(1))
}

/// Acquire `key` for the tenant in `ctx`, run `work` on its own task and keep
/// the lease renewed every `ttl / 3` until the work finishes.
///
/// Returns the first of: the work's result, `Canceled` if `ctx` is canceled,
/// or the renewal error if a renewal fails. Any exit other than work
/// completion cancels the context handed to `work`; its eventual result is
/// then discarded. The lease is released on every path after acquisition,
/// with a fresh context so that cancellation of `ctx` cannot prevent it;
/// release failures are logged only.
pub async fn with_lease<C, F, Fut, T, E>(
    ctx: &Context,
    client: &C,
    key: &str,
    ttl: Duration,
    max_attempts: u32,
    work: F,
) -> Result<T, E>
where
    C: LeaseClient + ?Sized,
    F: FnOnce(Context) -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    let tenant_id = ctx.tenant_id()?;
    let work_ctx = ctx.child();

    let mut lease = client.acquire(&work_ctx, tenant_id, key, ttl, max_attempts).await?;
    debug!(tenant = %tenant_id, key, lease_id = %lease.id, "lease acquired, starting work");

    let outcome = supervise(&work_ctx, client, &mut lease, work).await;
    work_ctx.cancel();

    let cleanup = Context::new().with_tenant(tenant_id);
    if let Err(err) = client.release(&cleanup, &lease).await {
        error!(tenant = %tenant_id, key, lease_id = %lease.id, error = %err, "failed to release lease");
    }
    outcome
}

async fn supervise<C, F, Fut, T, E>(work_ctx: &Context, client: &C, lease: &mut Lease, work: F) -> Result<T, E>
where
    C: LeaseClient + ?Sized,
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    let mut handle = tokio::spawn(work(work_ctx.clone()));

    let period = renew_interval(lease.ttl);
    let mut renew_ticker = tokio::time::interval_at(Instant::now() + period, period);
    renew_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            joined = &mut handle => {
                return joined.unwrap_or_else(|e| Err(Error::WorkAborted(e.to_string()).into()));
            }
            () = work_ctx.cancelled() => return Err(Error::Canceled.into()),
            _ = renew_ticker.tick() => {
                if let Err(err) = client.renew(work_ctx, lease).await {
                    warn!(key = %lease.key, lease_id = %lease.id, error = %err, "failed to renew lease");
                    // The work may now be running without a valid lease.
                    work_ctx.cancel();
                    return Err(err.into());
                }
            }
        }
    }
}
