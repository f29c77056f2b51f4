use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Tunables shared by the lease store and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Bound on each client round trip, independent of any lease TTL
    #[serde(with = "millis")]
    pub request_timeout: Duration,

    /// First wait between contended acquire attempts; doubles per attempt
    #[serde(with = "millis")]
    pub backoff_base: Duration,

    #[serde(with = "millis")]
    pub backoff_max: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl LeaseConfig {
    /// Defaults overridden by `LEASE_REQUEST_TIMEOUT_MS`,
    /// `LEASE_BACKOFF_BASE_MS` and `LEASE_BACKOFF_MAX_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup("LEASE_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis("LEASE_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("LEASE_BACKOFF_BASE_MS") {
            config.backoff_base = parse_millis("LEASE_BACKOFF_BASE_MS", &value)?;
        }
        if let Some(value) = lookup("LEASE_BACKOFF_MAX_MS") {
            config.backoff_max = parse_millis("LEASE_BACKOFF_MAX_MS", &value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidArgument("request timeout must be positive".into()));
        }
        if self.backoff_max < self.backoff_base {
            return Err(Error::InvalidArgument(format!(
                "backoff max {:?} is below backoff base {:?}",
                self.backoff_max, self.backoff_base
            )));
        }
        Ok(())
    }

    /// Wait after the `attempt`-th failed acquire (1-based): base doubled per
    /// attempt, capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| Error::InvalidArgument(format!("{name}={value:?}: {e}")))
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
