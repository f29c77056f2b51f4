use crate::TenantId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// Serializable so a store-side failure reaches the client unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lease already held for key {key:?} (after {attempts} attempts)")]
    LeaseHeld { key: String, attempts: u32 },

    #[error("No leases found for tenant {tenant}")]
    NoSuchTenant { tenant: TenantId },

    #[error("No lease for key {key:?}")]
    NoSuchLease { key: String },

    #[error("Lease ID mismatch for key {key:?}")]
    OwnershipMismatch { key: String },

    #[error("Cannot renew expired lease for key {key:?}")]
    LeaseExpired { key: String },

    #[error("Tenant ID not found in context")]
    MissingTenant,

    #[error("Operation canceled")]
    Canceled,

    #[error("Supervised work aborted: {0}")]
    WorkAborted(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    #[error("request to {route} timed out after {timeout:?}")]
    Timeout { route: String, timeout: Duration },

    #[error("no handler registered for {route}")]
    NoHandler { route: String },

    #[error("handler already registered for {route}")]
    DuplicateHandler { route: String },

    #[error("connection closed before {route} replied")]
    Closed { route: String },

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Transport(TransportError::Codec(err.to_string()))
    }
}

impl Error {
    /// True for failures raised by the transport rather than the store.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
