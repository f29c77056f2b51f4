use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub type Timestamp = DateTime<Utc>;

/// Wall clock shared by the store and its clients.
///
/// Reads `Utc::now()` shifted by a physical offset. The offset only ever
/// grows, so `now()` never runs backwards because of it.
#[derive(Debug)]
pub struct Clock {
    physical_offset: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            physical_offset: AtomicI64::new(0),
        }
    }

    pub fn now(&self) -> Timestamp {
        Utc::now() + Duration::milliseconds(self.physical_offset.load(Ordering::SeqCst))
    }

    /// Moves this clock forward by `by`.
    pub fn advance(&self, by: std::time::Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.physical_offset.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn offset(&self) -> std::time::Duration {
        let ms = self.physical_offset.load(Ordering::SeqCst);
        std::time::Duration::from_millis(u64::try_from(ms).unwrap_or(0))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// `at + ttl`, saturating at the far end of the representable range.
pub fn deadline(at: Timestamp, ttl: std::time::Duration) -> Timestamp {
    Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
