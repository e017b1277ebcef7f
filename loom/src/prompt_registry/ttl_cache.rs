//! TTL cache over raw (pre-interpolation) prompt bodies. A hit still re-interpolates per call, so a session's variables
//! are honored at zero extra storage cost; only the *lookup* of the raw
//! template is cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Entry {
    body: String,
    expires_at: Instant,
}

/// Keyed by `(key, variant)`.
pub struct PromptTtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PromptTtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str, variant: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        let k = (key.to_string(), variant.to_string());
        match entries.get(&k) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.body.clone())
            }
            Some(_) => {
                entries.remove(&k);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: &str, variant: &str, body: String) {
        self.entries.lock().unwrap().insert(
            (key.to_string(), variant.to_string()),
            Entry {
                body,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Clears every cached entry.
    pub fn invalidate(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Clears every variant of one key.
    pub fn invalidate_key(&self, key: &str) {
        self.entries.lock().unwrap().retain(|(k, _), _| k != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_put_then_miss_after_expiry() {
        let cache = PromptTtlCache::new(Duration::from_millis(5));
        assert!(cache.get("k", "default").is_none());
        cache.put("k", "default", "body".to_string());
        assert_eq!(cache.get("k", "default").as_deref(), Some("body"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k", "default").is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn invalidate_key_only_clears_that_key() {
        let cache = PromptTtlCache::new(Duration::from_secs(60));
        cache.put("a", "default", "a-body".to_string());
        cache.put("b", "default", "b-body".to_string());
        cache.invalidate_key("a");
        assert!(cache.get("a", "default").is_none());
        assert!(cache.get("b", "default").is_some());
    }
}
