use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Process-wide default lifetime of a reference entry.
pub const DEFAULT_TTL_SECS: i64 = 600;

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Manual clock (deterministic expiry in tests) ─────────────────────────────

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// Key/value store whose entries expire `ttl` after insertion.
///
/// Expiry is enforced lazily when an entry is read; there is no sweeper.
/// Writes replace a key in place under the write lock, so a refresh never
/// exposes a window in which concurrent readers see the key missing.
pub struct ReferenceCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> Default for ReferenceCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ReferenceCache<V> {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

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

    /// Returns the live value for `key`. An expired entry is evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return None,
                Some(entry) if self.is_live(entry, now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a writer may have refreshed the key
        // between the two acquisitions.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if self.is_live(entry, now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                tracing::debug!(key, "evicted expired reference entry");
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = Entry {
            value,
            inserted_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether `key` is physically stored, expired or not. Never evicts.
    pub fn is_resident(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, entry: &Entry<V>, now: DateTime<Utc>) -> bool {
        now - entry.inserted_at <= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manual_cache(ttl_secs: i64) -> (ReferenceCache<String>, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cache = ReferenceCache::with_clock(Duration::seconds(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn get_returns_live_value() {
        let (cache, _) = manual_cache(60);
        cache.set("k", "v".to_string());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entry_is_absent_and_evicted() {
        let (cache, clock) = manual_cache(1);
        cache.set("k", "v".to_string());
        clock.advance(Duration::milliseconds(1500));

        assert!(cache.is_resident("k"));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.is_resident("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_is_live_exactly_at_ttl() {
        let (cache, clock) = manual_cache(1);
        cache.set("k", "v".to_string());
        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn set_overwrites_and_restarts_lifetime() {
        let (cache, clock) = manual_cache(10);
        cache.set("k", "old".to_string());
        clock.advance(Duration::seconds(8));
        cache.set("k", "new".to_string());
        clock.advance(Duration::seconds(8));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_and_clear() {
        let (cache, _) = manual_cache(60);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.delete("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn default_ttl_is_ten_minutes() {
        let cache: ReferenceCache<String> = ReferenceCache::new();
        assert_eq!(cache.ttl(), Duration::seconds(600));
    }

    #[test]
    fn wall_clock_expiry() {
        let cache = ReferenceCache::with_ttl(Duration::seconds(1));
        cache.set("k", "v".to_string());
        std::thread::sleep(std::time::Duration::from_millis(1500));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.is_resident("k"));
    }

    #[test]
    fn readers_never_miss_a_key_during_refresh() {
        let (cache, _) = manual_cache(60);
        cache.set("merchant_aliases", "v0".to_string());

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        assert!(cache.get("merchant_aliases").is_some());
                    }
                });
            }
            s.spawn(|| {
                for i in 0..1_000 {
                    cache.set("merchant_aliases", format!("v{i}"));
                }
            });
        });

        assert_eq!(cache.get("merchant_aliases").as_deref(), Some("v999"));
    }
}
