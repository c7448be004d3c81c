//! Backend availability cache.
//!
//! Records whether a local backend answered its last probe, so dispatch does
//! not probe on every call. Entries expire after a TTL measured by an
//! injectable [`Clock`], which lets tests expire entries deterministically.
//!
//! The cache is the only state shared across concurrent runs. Readers and
//! refreshers only take short read/replace locks; two runs refreshing the
//! same entry at once just probe twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::providers::BackendFamily;

/// Default time an availability answer stays fresh.
pub const DEFAULT_AVAILABILITY_TTL: Duration = Duration::from_secs(60);

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    available: bool,
    checked_at: Instant,
}

/// Time-bounded record of which backends are reachable.
pub struct AvailabilityCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<BackendFamily, Entry>>,
}

impl AvailabilityCache {
    /// Create a cache on the wall clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache on a custom clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh availability for a family, or `None` when unknown or stale.
    pub fn get(&self, family: BackendFamily) -> Option<bool> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(&family)
            .filter(|entry| now.saturating_duration_since(entry.checked_at) < self.ttl)
            .map(|entry| entry.available)
    }

    /// Record a probe result, replacing any previous entry.
    pub fn record(&self, family: BackendFamily, available: bool) {
        let entry = Entry {
            available,
            checked_at: self.clock.now(),
        };
        self.entries.write().insert(family, entry);
        tracing::debug!(family = %family, available, "Availability cache refreshed");
    }

    /// Forget a family's entry.
    pub fn invalidate(&self, family: BackendFamily) {
        self.entries.write().remove(&family);
    }

    /// Forget everything.
    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    /// Number of entries, fresh or stale.
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for AvailabilityCache {
    fn default() -> Self {
        Self::new(DEFAULT_AVAILABILITY_TTL)
    }
}

impl std::fmt::Debug for AvailabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_clock() -> (AvailabilityCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = AvailabilityCache::with_clock(Duration::from_secs(60), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_unknown_family_is_none() {
        let (cache, _) = cache_with_clock();
        assert_eq!(cache.get(BackendFamily::Ollama), None);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.record(BackendFamily::Ollama, true);

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(BackendFamily::Ollama), Some(true));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(BackendFamily::Ollama), None);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_record_replaces_and_restarts_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.record(BackendFamily::Ollama, true);
        clock.advance(Duration::from_secs(30));
        cache.record(BackendFamily::Ollama, false);
        clock.advance(Duration::from_secs(45));

        assert_eq!(cache.get(BackendFamily::Ollama), Some(false));
    }

    #[test]
    fn test_invalidate() {
        let (cache, _) = cache_with_clock();
        cache.record(BackendFamily::Ollama, true);
        cache.record(BackendFamily::Groq, true);

        cache.invalidate(BackendFamily::Ollama);
        assert_eq!(cache.get(BackendFamily::Ollama), None);
        assert_eq!(cache.get(BackendFamily::Groq), Some(true));

        cache.invalidate_all();
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_concurrent_refresh_is_harmless() {
        let (cache, _) = cache_with_clock();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.record(BackendFamily::Ollama, i % 2 == 0);
                    cache.get(BackendFamily::Ollama)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_some());
        }
        assert_eq!(cache.entry_count(), 1);
    }
}
