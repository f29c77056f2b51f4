use crate::{
    transport::{Handler, Route, Transport},
    Context, Error, Result, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// In-process transport: each request runs its handler on a separate task
/// and is answered over a oneshot channel.
#[derive(Debug, Default)]
pub struct LocalBus {
    handlers: DashMap<Route, HandlerEntry>,
    closed: AtomicBool,
}

struct HandlerEntry(Handler);

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop delivering: later sends fail with `Closed`, as after losing the
    /// connection to a remote bus.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Exact tenant route first, then the wildcard for its endpoint.
    fn resolve(&self, route: &Route) -> Option<Handler> {
        self.handlers
            .get(route)
            .or_else(|| self.handlers.get(&route.wildcard()))
            .map(|entry| entry.0.clone())
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn send(&self, ctx: &Context, route: &Route, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        ctx.check()?;
        if self.is_closed() {
            return Err(TransportError::Closed { route: route.to_string() }.into());
        }
        let handler = self
            .resolve(route)
            .ok_or_else(|| TransportError::NoHandler { route: route.to_string() })?;

        let call_ctx = match route.tenant {
            Some(tenant) => ctx.child().with_tenant(tenant),
            None => ctx.child(),
        };
        // Cancels the handler's context once this call returns, however it
        // returns.
        let _guard = call_ctx.token().clone().drop_guard();

        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::spawn(async move {
            let reply = handler(call_ctx, payload).await;
            let _ = reply_tx.send(reply);
        });

        tokio::select! {
            () = ctx.cancelled() => Err(Error::Canceled),
            reply = tokio::time::timeout(timeout, reply_rx) => match reply {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(_)) => {
                    warn!(%route, "handler dropped its reply");
                    Err(TransportError::Closed { route: route.to_string() }.into())
                }
                Err(_) => {
                    debug!(%route, ?timeout, "request timed out");
                    Err(TransportError::Timeout { route: route.to_string(), timeout }.into())
                }
            },
        }
    }

    fn register_handler(&self, route: Route, handler: Handler) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.handlers.entry(route) {
            Entry::Occupied(entry) => Err(TransportError::DuplicateHandler {
                route: entry.key().to_string(),
            }
            .into()),
            Entry::Vacant(entry) => {
                debug!(route = %entry.key(), "handler registered");
                entry.insert(HandlerEntry(handler));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TenantId;
    use futures::FutureExt;
    use std::sync::Arc;

    fn echo() -> Handler {
        Arc::new(|_ctx: Context, payload: Bytes| async move { payload }.boxed())
    }

    fn constant(reply: &'static [u8]) -> Handler {
        Arc::new(move |_ctx: Context, _payload: Bytes| async move { Bytes::from_static(reply) }.boxed())
    }

    #[tokio::test]
    async fn delivers_to_wildcard_and_prefers_tenant_route() {
        let bus = LocalBus::new();
        let route = Route::new("leases", "acquire");
        let special = TenantId::new();
        bus.register_handler(route.clone(), constant(b"any")).unwrap();
        bus.register_handler(route.for_tenant(special), constant(b"special")).unwrap();

        let ctx = Context::new();
        let timeout = Duration::from_secs(1);
        let other = bus
            .send(&ctx, &route.for_tenant(TenantId::new()), Bytes::new(), timeout)
            .await
            .unwrap();
        let own = bus.send(&ctx, &route.for_tenant(special), Bytes::new(), timeout).await.unwrap();

        assert_eq!(&other[..], b"any");
        assert_eq!(&own[..], b"special");
    }

    #[tokio::test]
    async fn missing_handler_and_duplicates() {
        let bus = LocalBus::new();
        let route = Route::new("leases", "renew");

        let err = bus
            .send(&Context::new(), &route, Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::NoHandler { .. })));

        bus.register_handler(route.clone(), echo()).unwrap();
        let err = bus.register_handler(route, echo()).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::DuplicateHandler { .. })));
        assert_eq!(bus.handler_count(), 1);
    }

    #[tokio::test]
    async fn timeout_cancels_handler_context() {
        let bus = LocalBus::new();
        let route = Route::new("leases", "acquire");
        let (seen_tx, seen_rx) = oneshot::channel();
        let seen_tx = Arc::new(parking_lot::Mutex::new(Some(seen_tx)));

        bus.register_handler(
            route.clone(),
            Arc::new(move |ctx: Context, _payload: Bytes| {
                let seen_tx = seen_tx.clone();
                async move {
                    ctx.cancelled().await;
                    if let Some(tx) = seen_tx.lock().take() {
                        let _ = tx.send(());
                    }
                    Bytes::new()
                }
                .boxed()
            }),
        )
        .unwrap();

        let err = bus
            .send(&Context::new(), &route, Bytes::new(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })));

        tokio::time::timeout(Duration::from_secs(1), seen_rx)
            .await
            .expect("handler should observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn caller_cancellation_and_close() {
        let bus = LocalBus::new();
        let route = Route::new("leases", "release");
        bus.register_handler(
            route.clone(),
            Arc::new(|_ctx: Context, _payload: Bytes| {
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Bytes::new()
                }
                .boxed()
            }),
        )
        .unwrap();

        let ctx = Context::new();
        let canceler = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceler.cancel();
        });
        let err = bus.send(&ctx, &route, Bytes::new(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, Error::Canceled);

        bus.close();
        let err = bus
            .send(&Context::new(), &route, Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Closed { .. })));
    }
}
