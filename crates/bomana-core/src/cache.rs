use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::channel::Channel;
use crate::manifest::CanonicalManifest;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const MIN_CACHE_TTL: Duration = Duration::from_secs(30);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    stored_at: Instant,
    value: CanonicalManifest,
}

/// Per-channel memo of the last successful remote resolution.
///
/// Entries older than the TTL are treated as absent; nothing is swept
/// proactively.
pub struct ResolutionCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<Channel, CacheEntry>>,
}

impl ResolutionCache {
    /// Create a cache using the wall clock. TTLs below [`MIN_CACHE_TTL`] are raised to it.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: ttl.max(MIN_CACHE_TTL),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn get(&self, channel: Channel) -> Option<CanonicalManifest> {
        let now = self.clock.now();
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        entries
            .get(&channel)
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Current time on the cache's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn put(&self, channel: Channel, value: CanonicalManifest) {
        self.put_at(channel, value, self.clock.now());
    }

    /// Store `value` as if it had been fetched at `stored_at`.
    ///
    /// Pass the time the fetch started so a slow fetch does not extend the
    /// entry's lifetime.
    pub fn put_at(&self, channel: Channel, value: CanonicalManifest, stored_at: Instant) {
        let entry = CacheEntry { stored_at, value };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, entry);
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
