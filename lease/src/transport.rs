use crate::{
    message::{Request, Response},
    Context, Error, Result, TenantId,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tracing::trace;

/// `namespace:endpoint`, optionally narrowed to one tenant.
///
/// A route without a tenant is a wildcard: a handler registered on it serves
/// every tenant that has no handler of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub namespace: String,
    pub endpoint: String,
    pub tenant: Option<TenantId>,
}

impl Route {
    pub fn new(namespace: &str, endpoint: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            endpoint: endpoint.to_string(),
            tenant: None,
        }
    }

    pub fn for_tenant(&self, tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
            ..self.clone()
        }
    }

    pub fn wildcard(&self) -> Self {
        Self {
            tenant: None,
            ..self.clone()
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.tenant.is_none()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.endpoint)?;
        if let Some(tenant) = self.tenant {
            write!(f, "@{tenant}")?;
        }
        Ok(())
    }
}

/// Serves one route. Receives a context canceled when the requester gives up,
/// returns the encoded reply.
pub type Handler = Arc<dyn Fn(Context, Bytes) -> BoxFuture<'static, Bytes> + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Deliver `payload` to the handler for `route` and wait for its reply,
    /// at most `timeout`, returning early with `Canceled` if `ctx` is.
    async fn send(&self, ctx: &Context, route: &Route, payload: Bytes, timeout: Duration) -> Result<Bytes>;

    fn register_handler(&self, route: Route, handler: Handler) -> Result<()>;
}

/// Encode `request`, send it to `route` and decode the typed reply.
pub async fn send_request<R: Request>(
    transport: &dyn Transport,
    ctx: &Context,
    route: &Route,
    request: &R,
    timeout: Duration,
) -> Result<R::Response> {
    trace!(%route, discriminator = R::DISCRIMINATOR, "sending request");
    let payload = Bytes::from(bincode::serialize(request)?);
    let reply = transport.send(ctx, route, payload, timeout).await?;
    let reply: std::result::Result<R::Response, Error> = bincode::deserialize(&reply)?;
    trace!(%route, discriminator = <R::Response as Response>::DISCRIMINATOR, ok = reply.is_ok(), "reply received");
    reply
}

/// Register a typed handler: decodes `R`, runs `handler`, encodes its result.
pub fn register_request_handler<R, F, Fut>(transport: &dyn Transport, route: Route, handler: F) -> Result<()>
where
    R: Request,
    F: Fn(Context, R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Response>> + Send + 'static,
{
    let handler = Arc::new(handler);
    let erased: Handler = Arc::new(move |ctx: Context, payload: Bytes| {
        let handler = Arc::clone(&handler);
        async move {
            let reply = match bincode::deserialize::<R>(&payload) {
                Ok(request) => handler(ctx, request).await,
                Err(e) => Err(Error::from(e)),
            };
            encode_reply(&reply)
        }
        .boxed()
    });
    transport.register_handler(route, erased)
}

fn encode_reply<T: Serialize>(reply: &Result<T>) -> Bytes {
    match bincode::serialize(reply) {
        Ok(bytes) => Bytes::from(bytes),
        // An undecodable reply surfaces as a codec error on the requester.
        Err(e) => bincode::serialize(&Err::<(), Error>(Error::from(e)))
            .map(Bytes::from)
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Accepted, ReleaseRequest};
    use crate::LeaseId;

    #[test]
    fn route_display() {
        let route = Route::new("leases", "renew");
        assert_eq!(route.to_string(), "leases:renew");
        assert!(route.is_wildcard());

        let tenant = TenantId::new();
        let scoped = route.for_tenant(tenant);
        assert!(!scoped.is_wildcard());
        assert_eq!(scoped.to_string(), format!("leases:renew@{tenant}"));
    }

    #[test]
    fn error_replies_survive_encoding() {
        let reply: Result<Accepted> = Err(Error::OwnershipMismatch { key: "job-42".into() });
        let bytes = encode_reply(&reply);
        let decoded: std::result::Result<Accepted, Error> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn requests_survive_encoding() {
        let req = ReleaseRequest {
            id: LeaseId::new(),
            tenant_id: TenantId::new(),
            key: "job-42".into(),
        };
        let bytes = bincode::serialize(&req).unwrap();
        assert_eq!(bincode::deserialize::<ReleaseRequest>(&bytes).unwrap(), req);
    }
}
