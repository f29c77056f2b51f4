use crate::{lease::Lease, transport::Route, LeaseId, TenantId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "leases";

/// A typed request bound to one route of a [`LeaseRoutes`] table.
pub trait Request: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Response: Response;

    /// Stable name of the payload type, used in logs.
    const DISCRIMINATOR: &'static str;

    /// Tenant-scoped route this request is delivered to.
    fn route(&self, routes: &LeaseRoutes) -> Route;
}

pub trait Response: Serialize + DeserializeOwned + Send + 'static {
    const DISCRIMINATOR: &'static str;
}

/// Route table built once at startup and handed to both the service and its
/// clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRoutes {
    pub acquire: Route,
    pub renew: Route,
    pub release: Route,
}

impl LeaseRoutes {
    pub fn new(namespace: &str) -> Self {
        Self {
            acquire: Route::new(namespace, "acquire"),
            renew: Route::new(namespace, "renew"),
            release: Route::new(namespace, "release"),
        }
    }
}

impl Default for LeaseRoutes {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireRequest {
    pub id: LeaseId,
    pub tenant_id: TenantId,
    pub key: String,
    pub ttl: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewRequest {
    pub id: LeaseId,
    pub tenant_id: TenantId,
    pub key: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub id: LeaseId,
    pub tenant_id: TenantId,
    pub key: String,
}

/// Empty acknowledgement for renew and release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted;

impl Request for AcquireRequest {
    type Response = Lease;
    const DISCRIMINATOR: &'static str = "lease/acquire";

    fn route(&self, routes: &LeaseRoutes) -> Route {
        routes.acquire.for_tenant(self.tenant_id)
    }
}

impl Request for RenewRequest {
    type Response = Accepted;
    const DISCRIMINATOR: &'static str = "lease/renew";

    fn route(&self, routes: &LeaseRoutes) -> Route {
        routes.renew.for_tenant(self.tenant_id)
    }
}

impl Request for ReleaseRequest {
    type Response = Accepted;
    const DISCRIMINATOR: &'static str = "lease/release";

    fn route(&self, routes: &LeaseRoutes) -> Route {
        routes.release.for_tenant(self.tenant_id)
    }
}

impl Response for Lease {
    const DISCRIMINATOR: &'static str = "lease/lease";
}

impl Response for Accepted {
    const DISCRIMINATOR: &'static str = "lease/accepted";
}

impl From<&Lease> for RenewRequest {
    fn from(lease: &Lease) -> Self {
        Self {
            id: lease.id,
            tenant_id: lease.tenant_id,
            key: lease.key.clone(),
            ttl: lease.ttl,
        }
    }
}

impl From<&Lease> for ReleaseRequest {
    fn from(lease: &Lease) -> Self {
        Self {
            id: lease.id,
            tenant_id: lease.tenant_id,
            key: lease.key.clone(),
        }
    }
}
