use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::resolver::ResolveInput;

/// Result-cache key.  Query text is trimmed and lowercased only; full
/// normalization happens after the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ResultKey {
    pub text: String,
    pub hint: Option<String>,
    pub lang: Option<String>,
    pub context: Option<String>,
}

impl ResultKey {
    pub fn new(input: &ResolveInput) -> Self {
        Self {
            text: input.text.trim().to_lowercase(),
            hint: input.hint_subject_id.clone(),
            lang: input.context_lang.clone(),
            context: input.context_key.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Stamped<V> {
    value: V,
    /// Index generation the value was derived from.
    generation: u64,
    stored_at: Instant,
}

/// Least-recently-used cache with a per-entry time-to-live.
///
/// Entries are tagged with the index generation that produced them; a lookup
/// under a different generation is a miss and drops the entry, so a resolve
/// that raced a rebuild cannot leak stale ids into the new generation.
pub(crate) struct TtlCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, Stamped<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Fresh value for `key`, promoting it to most recently used.
    pub fn get(&self, key: &K, generation: u64) -> Option<V> {
        let mut cache = self.inner.lock();
        let live = match cache.get(key) {
            Some(entry) => entry.generation == generation && entry.stored_at.elapsed() < self.ttl,
            None => return None,
        };
        if live {
            cache.get(key).map(|entry| entry.value.clone())
        } else {
            cache.pop(key);
            None
        }
    }

    /// Insert or replace; evicts the least recently used entry when full.
    pub fn put(&self, key: K, generation: u64, value: V) {
        self.inner.lock().put(
            key,
            Stamped {
                value,
                generation,
                stored_at: Instant::now(),
            },
        );
    }

    /// Read-modify-write under one lock.  `update` receives the current fresh
    /// value (or `None`) and returns the value to store; the entry's TTL
    /// restarts.
    pub fn upsert<F>(&self, key: K, generation: u64, update: F) -> V
    where
        F: FnOnce(Option<V>) -> V,
    {
        let mut cache = self.inner.lock();
        let current = cache
            .pop(&key)
            .filter(|entry| entry.generation == generation && entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value);
        let value = update(current);
        cache.put(
            key,
            Stamped {
                value: value.clone(),
                generation,
                stored_at: Instant::now(),
            },
        );
        value
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key).map(|entry| entry.value)
    }

    /// Drop every entry whose key matches `predicate`.
    pub fn remove_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let mut cache = self.inner.lock();
        let doomed: Vec<K> = cache
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            cache.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
