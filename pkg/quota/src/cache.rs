use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

/// Bounded LRU map whose entries optionally expire after a fixed TTL.
/// Expired entries are dropped lazily on read.
pub struct ExpiringCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<K: Hash + Eq, V: Clone> ExpiringCache<K, V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.expires_at.is_some_and(|at| Instant::now() >= at),
        };
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().put(key, Entry { value, expires_at });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().pop(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
