use crate::{
    bus::LocalBus,
    client::RemoteLeaseClient,
    config::LeaseConfig,
    message::LeaseRoutes,
    service::LeaseService,
    store::LeaseStore,
    time::Clock,
    transport::{Handler, Route, Transport},
    Context, Result, TenantId, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;

/// What happens to requests for one endpoint.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Delivered after an extra delay
    Delay(Duration),
    /// Rejected with this error, never delivered
    Fail(TransportError),
    /// Delivered normally for the first `n` requests, rejected afterwards
    FailAfter(usize, TransportError),
}

/// Wraps a transport and injects latency or failures per endpoint, keyed by
/// `namespace:endpoint` regardless of tenant.
#[derive(Debug)]
pub struct FaultyTransport {
    inner: Arc<dyn Transport>,
    faults: DashMap<String, Fault>,
    sent: DashMap<String, AtomicUsize>,
}

impl FaultyTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            faults: DashMap::new(),
            sent: DashMap::new(),
        }
    }

    pub fn inject(&self, route: &Route, fault: Fault) {
        self.faults.insert(route.wildcard().to_string(), fault);
    }

    pub fn heal(&self, route: &Route) {
        self.faults.remove(&route.wildcard().to_string());
    }

    /// Requests sent to `route`'s endpoint so far, faulted or not.
    pub fn sent(&self, route: &Route) -> usize {
        self.sent
            .get(&route.wildcard().to_string())
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn send(&self, ctx: &Context, route: &Route, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let endpoint = route.wildcard().to_string();
        let previous = self
            .sent
            .entry(endpoint.clone())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);

        let fault = self.faults.get(&endpoint).map(|f| f.clone());
        match fault {
            Some(Fault::Fail(err)) => return Err(err.into()),
            Some(Fault::FailAfter(n, err)) if previous >= n => return Err(err.into()),
            Some(Fault::Delay(delay)) => sleep(delay).await,
            _ => {}
        }
        self.inner.send(ctx, route, payload, timeout).await
    }

    fn register_handler(&self, route: Route, handler: Handler) -> Result<()> {
        self.inner.register_handler(route, handler)
    }
}

/// A started lease service and a client wired to it through a
/// [`FaultyTransport`] over a [`LocalBus`].
#[derive(Debug)]
pub struct TestHarness {
    pub clock: Arc<Clock>,
    pub bus: Arc<LocalBus>,
    pub transport: Arc<FaultyTransport>,
    pub service: LeaseService,
    pub client: RemoteLeaseClient,
    pub routes: LeaseRoutes,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        Self::with_config(LeaseConfig {
            request_timeout: Duration::from_secs(1),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(200),
        })
    }

    pub fn with_config(config: LeaseConfig) -> Result<Self> {
        let clock = Arc::new(Clock::new());
        let routes = LeaseRoutes::default();
        let bus = Arc::new(LocalBus::new());
        let transport = Arc::new(FaultyTransport::new(bus.clone()));

        let store = Arc::new(LeaseStore::new(Arc::clone(&clock), config));
        let service = LeaseService::new(store, routes.clone());
        service.start(transport.as_ref())?;

        let client = RemoteLeaseClient::new(transport.clone(), routes.clone(), Arc::clone(&clock), &config);
        Ok(Self {
            clock,
            bus,
            transport,
            service,
            client,
            routes,
        })
    }

    pub fn store(&self) -> &Arc<LeaseStore> {
        self.service.store()
    }

    /// Root context scoped to `tenant`.
    pub fn ctx(tenant: TenantId) -> Context {
        Context::new().with_tenant(tenant)
    }
}

#[derive(Debug)]
pub struct LatencyMeasurement {
    pub operation: String,
    pub start_time: std::time::Instant,
    pub latency: Duration,
}

impl LatencyMeasurement {
    pub fn start(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start_time: std::time::Instant::now(),
            latency: Duration::ZERO,
        }
    }

    pub fn stop(&mut self) {
        self.latency = self.start_time.elapsed();
    }

    pub fn assert_milliseconds(&self, max_ms: u64) {
        assert!(
            self.latency <= Duration::from_millis(max_ms),
            "{} took {}ms, expected <= {}ms",
            self.operation,
            self.latency.as_millis(),
            max_ms
        );
    }
}
