//! Response cache with per-entry TTL.
//!
//! Keys are request fingerprints. An entry is fresh while
//! `now - stored_at < ttl`; reading a stale entry removes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;
use trellis_util::{canonical_string, redact_sensitive};

/// Millisecond clock, injectable so TTL behavior can be tested.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock anchored at construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: u64,
    ttl: u64,
}

pub struct CacheStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::default()))
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("entries", &self.len()).finish()
    }
}

impl CacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`. A stale entry is evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if now.saturating_sub(entry.stored_at) >= entry.ttl {
            debug!(key = %redact_sensitive(key), "cache entry expired");
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now_millis(),
            ttl: ttl.as_millis() as u64,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), entry);
    }

    /// Whether an entry is present, fresh or not. Does not evict.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Cache key for a request: method, target and the canonical serialization
/// of everything else that shapes the response. Equal keys mean equal
/// requests; nothing is hashed away.
pub fn fingerprint(method: &str, target: &str, shape: &Value) -> String {
    format!("{} {}#{}", method.to_ascii_uppercase(), target, canonical_string(shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_expires_exactly_at_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = CacheStore::new(clock.clone());
        cache.put("k", json!(1), Duration::from_millis(1000));

        clock.advance(Duration::from_millis(999));
        assert_eq!(cache.get("k"), Some(json!(1)));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.contains("k"));
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let left = fingerprint("get", "https://x.test/a", &json!({"query": {"a": 1, "b": 2}}));
        let right = fingerprint("GET", "https://x.test/a", &json!({"query": {"b": 2, "a": 1}}));
        assert_eq!(left, right);
        assert!(left.starts_with("GET https://x.test/a#"));
        assert_ne!(left, fingerprint("GET", "https://x.test/a", &json!({"query": {"a": 2}})));
    }

    #[test]
    fn fingerprint_carries_the_full_request_shape() {
        let key = fingerprint("GET", "https://x.test/me", &json!({"headers": {"authorization": "Bearer alice"}}));
        assert_eq!(key, r#"GET https://x.test/me#{"headers":{"authorization":"Bearer alice"}}"#);

        let cache = CacheStore::new(Arc::new(ManualClock::new(0)));
        cache.put(key, json!("alice"), Duration::from_secs(60));
        let other = fingerprint("GET", "https://x.test/me", &json!({"headers": {"authorization": "Bearer bob"}}));
        assert_eq!(cache.get(&other), None);
    }
}
