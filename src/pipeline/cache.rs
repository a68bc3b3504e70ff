//! Time-boxed response cache
//!
//! Keyed by call parameters, entries expire `ttl` after insertion and are
//! never updated in place. The lock is only held for map operations, so two
//! concurrent misses on the same key may both go upstream; the later insert
//! wins.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,

    /// Clock source (for testing with mock time)
    now_fn: Box<dyn Fn() -> Instant + Send + Sync>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::new_with_clock(ttl, Box::new(Instant::now))
    }

    pub fn new_with_clock(ttl: Duration, now_fn: Box<dyn Fn() -> Instant + Send + Sync>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            now_fn,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, evicting it if expired
    pub fn get(&self, key: &K) -> Option<V> {
        let now = (self.now_fn)();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = (self.now_fn)() + self.ttl;
        self.lock().insert(key, CacheEntry { value, expires_at });
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = (self.now_fn)();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn mock_clock() -> (Arc<Mutex<Instant>>, Box<dyn Fn() -> Instant + Send + Sync>) {
        let now = Arc::new(Mutex::new(Instant::now()));
        let handle = now.clone();
        (now, Box::new(move || *handle.lock().unwrap()))
    }

    #[test]
    fn test_hit_within_ttl() {
        let (_, clock) = mock_clock();
        let cache: TtlCache<String, u32> = TtlCache::new_with_clock(Duration::from_secs(120), clock);

        cache.insert("markets:100".to_string(), 7);
        assert_eq!(cache.get(&"markets:100".to_string()), Some(7));
        assert_eq!(cache.get(&"markets:50".to_string()), None);
    }

    #[test]
    fn test_expires_after_ttl() {
        let (now, clock) = mock_clock();
        let cache: TtlCache<(String, u32), Vec<f64>> =
            TtlCache::new_with_clock(Duration::from_secs(120), clock);

        let key = ("bitcoin".to_string(), 1);
        cache.insert(key.clone(), vec![1.0, 2.0]);

        *now.lock().unwrap() += Duration::from_secs(119);
        assert_eq!(cache.get(&key), Some(vec![1.0, 2.0]));

        *now.lock().unwrap() += Duration::from_secs(1);
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let (now, clock) = mock_clock();
        let cache: TtlCache<u32, u32> = TtlCache::new_with_clock(Duration::from_secs(10), clock);

        cache.insert(1, 1);
        *now.lock().unwrap() += Duration::from_secs(5);
        cache.insert(2, 2);
        *now.lock().unwrap() += Duration::from_secs(6);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(2));
    }
}
