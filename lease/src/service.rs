use crate::{
    message::{AcquireRequest, LeaseRoutes, ReleaseRequest, RenewRequest},
    store::LeaseStore,
    transport::{register_request_handler, Transport},
    Context, Result,
};
use std::sync::Arc;
use tracing::info;

/// Serves a [`LeaseStore`] on the acquire, renew and release routes of a
/// route table.
#[derive(Debug, Clone)]
pub struct LeaseService {
    store: Arc<LeaseStore>,
    routes: LeaseRoutes,
}

impl LeaseService {
    pub fn new(store: Arc<LeaseStore>, routes: LeaseRoutes) -> Self {
        Self { store, routes }
    }

    /// Register one wildcard handler per route, serving every tenant.
    pub fn start(&self, transport: &dyn Transport) -> Result<()> {
        let store = Arc::clone(&self.store);
        register_request_handler(transport, self.routes.acquire.wildcard(), move |ctx: Context, req: AcquireRequest| {
            let store = Arc::clone(&store);
            async move { store.acquire(&ctx, req).await }
        })?;

        let store = Arc::clone(&self.store);
        register_request_handler(transport, self.routes.renew.wildcard(), move |_ctx: Context, req: RenewRequest| {
            let store = Arc::clone(&store);
            async move { store.renew(&req) }
        })?;

        let store = Arc::clone(&self.store);
        register_request_handler(transport, self.routes.release.wildcard(), move |_ctx: Context, req: ReleaseRequest| {
            let store = Arc::clone(&store);
            async move { Ok(store.release(&req)) }
        })?;

        info!(
            acquire = %self.routes.acquire,
            renew = %self.routes.renew,
            release = %self.routes.release,
            "lease service started"
        );
        Ok(())
    }

    pub fn store(&self) -> &Arc<LeaseStore> {
        &self.store
    }

    pub fn routes(&self) -> &LeaseRoutes {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::LocalBus, config::LeaseConfig, time::Clock, Error, TransportError};

    #[test]
    fn start_registers_three_routes_once() {
        let bus = LocalBus::new();
        let store = Arc::new(LeaseStore::new(Arc::new(Clock::new()), LeaseConfig::default()));
        let service = LeaseService::new(store, LeaseRoutes::default());

        service.start(&bus).unwrap();
        assert_eq!(bus.handler_count(), 3);

        let err = service.start(&bus).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::DuplicateHandler { .. })));
    }
}
