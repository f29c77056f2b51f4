#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod lease;
pub mod message;
pub mod service;
pub mod store;
pub mod supervisor;
pub mod time;
pub mod transport;

pub mod test_utils;

pub use client::{LeaseClient, RemoteLeaseClient};
pub use config::LeaseConfig;
pub use context::Context;
pub use error::{Error, Result, TransportError};
pub use lease::Lease;
pub use service::LeaseService;
pub use store::LeaseStore;
pub use supervisor::with_lease;

use std::fmt;

/// Partitions the lease key space. Two tenants never contend over a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TenantId(pub uuid::Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Minted by the acquirer; proves ownership on renew and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LeaseId(pub uuid::Uuid);

impl LeaseId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
