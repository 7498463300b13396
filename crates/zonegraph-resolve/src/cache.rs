//! TTL cache of resolution results.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;
use zonegraph_core::{normalize_name, ResolutionResult};

/// How long an entry stays fresh
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Entry bound before the oldest entries are evicted
pub const DEFAULT_MAX_ENTRIES: usize = 6000;

/// Source of the current time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock stopped at `start`
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(delta) = chrono::TimeDelta::from_std(by) {
            *now += delta;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache key for a hostname under a configuration partition
#[must_use]
pub fn cache_key(partition: &str, name: &str) -> String {
    format!("{partition}::{}", normalize_name(name))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ResolutionResult,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheInner {
    run_key: Option<String>,
    entries: HashMap<String, CacheEntry>,
}

/// Resolution results keyed by [`cache_key`].
///
/// The cache is bound to the run key it was last populated under; binding a
/// different key empties it.
#[derive(Debug)]
pub struct ResolutionCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ResolutionCache {
    /// Create a cache reading time from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Override TTL and size bound
    #[must_use]
    pub fn with_limits(mut self, ttl: Duration, max_entries: usize) -> Self {
        self.ttl = ttl;
        self.max_entries = max_entries.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        // A clock that went backwards leaves entries fresh.
        (now - entry.stored_at)
            .to_std()
            .map_or(true, |age| age <= self.ttl)
    }

    /// Fresh value for `key`
    pub fn get(&self, key: &str) -> Option<ResolutionResult> {
        let now = self.clock.now();
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value.clone())
    }

    /// Store one value
    pub fn put(&self, key: impl Into<String>, value: ResolutionResult) {
        self.put_many([(key.into(), value)]);
    }

    /// Store several values under one lock
    pub fn put_many<I>(&self, values: I)
    where
        I: IntoIterator<Item = (String, ResolutionResult)>,
    {
        let mut inner = self.lock();
        self.store(&mut inner, values);
    }

    /// Store `values` only while the cache is still bound to `run_key`.
    ///
    /// Returns false, storing nothing, once another run has rebound it.
    pub fn put_many_for<I>(&self, run_key: &str, values: I) -> bool
    where
        I: IntoIterator<Item = (String, ResolutionResult)>,
    {
        let mut inner = self.lock();
        if inner.run_key.as_deref() != Some(run_key) {
            return false;
        }
        self.store(&mut inner, values);
        true
    }

    fn store<I>(&self, inner: &mut CacheInner, values: I)
    where
        I: IntoIterator<Item = (String, ResolutionResult)>,
    {
        let now = self.clock.now();
        for (key, value) in values {
            inner.entries.insert(
                key,
                CacheEntry {
                    value,
                    stored_at: now,
                },
            );
        }

        if inner.entries.len() > self.max_entries {
            inner.entries.retain(|_, entry| self.is_fresh(entry, now));
        }
        let excess = inner.entries.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_age: Vec<(DateTime<Utc>, String)> = inner
                .entries
                .iter()
                .map(|(key, entry)| (entry.stored_at, key.clone()))
                .collect();
            by_age.sort();
            for (_, key) in by_age.into_iter().take(excess) {
                inner.entries.remove(&key);
            }
            debug!(evicted = excess, "resolution cache over capacity");
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, fresh or not
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind the cache to `run_key`, emptying it if it was bound to another.
    ///
    /// Returns true if entries were dropped.
    pub fn bind_run(&self, run_key: &str) -> bool {
        let mut inner = self.lock();
        if inner.run_key.as_deref() == Some(run_key) {
            return false;
        }
        let dropped = !inner.entries.is_empty();
        inner.entries.clear();
        inner.run_key = Some(run_key.to_string());
        if dropped {
            debug!(run_key, "run key changed, resolution cache cleared");
        }
        dropped
    }

    /// Run key the cache is bound to
    pub fn bound_run(&self) -> Option<String> {
        self.lock().run_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<ManualClock>, ResolutionCache) {
        let clock = Arc::new(ManualClock::default());
        let cache = ResolutionCache::new(clock.clone());
        (clock, cache)
    }

    fn result(name: &str) -> ResolutionResult {
        ResolutionResult {
            chain: vec![name.to_string()],
            terminal: name.to_string(),
            ipv4: vec!["192.0.2.1".into()],
            ..ResolutionResult::default()
        }
    }

    #[test]
    fn test_key_is_normalized() {
        assert_eq!(cache_key("p", "WWW.Example.com."), cache_key("p", "www.example.com"));
        assert_ne!(cache_key("p", "a.example.com"), cache_key("q", "a.example.com"));
    }

    #[test]
    fn test_hit_until_ttl() {
        let (clock, cache) = setup();
        cache.put("k", result("a.example.com"));

        clock.advance(Duration::from_secs(299));
        assert!(cache.get("k").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").is_some(), "exactly at TTL is still fresh");

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_bind_run_clears_on_change() {
        let (_clock, cache) = setup();
        assert!(!cache.bind_run("run-1"));
        cache.put("k", result("a.example.com"));

        assert!(!cache.bind_run("run-1"));
        assert_eq!(cache.len(), 1);

        assert!(cache.bind_run("run-2"));
        assert!(cache.is_empty());
        assert_eq!(cache.bound_run().as_deref(), Some("run-2"));
    }

    #[test]
    fn test_late_write_from_rebound_run_is_dropped() {
        let (_clock, cache) = setup();
        cache.bind_run("run-1");
        assert!(cache.put_many_for("run-1", [("a".to_string(), result("a"))]));

        cache.bind_run("run-2");
        assert!(!cache.put_many_for("run-1", [("b".to_string(), result("b"))]));
        assert!(cache.is_empty());

        assert!(cache.put_many_for("run-2", [("c".to_string(), result("c"))]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oldest_evicted_over_capacity() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResolutionCache::new(clock.clone()).with_limits(DEFAULT_TTL, 2);

        cache.put("first", result("first"));
        clock.advance(Duration::from_secs(1));
        cache.put("second", result("second"));
        clock.advance(Duration::from_secs(1));
        cache.put("third", result("third"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("first").is_none());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn test_expired_swept_before_eviction() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResolutionCache::new(clock.clone()).with_limits(Duration::from_secs(10), 2);

        cache.put("stale", result("stale"));
        clock.advance(Duration::from_secs(11));
        cache.put_many([
            ("a".to_string(), result("a")),
            ("b".to_string(), result("b")),
        ]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_some());
    }
}
