//! Bounded least-recently-used cache for query embeddings.

use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Default number of cached embeddings.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default number of leading characters that form the cache key.
pub const DEFAULT_KEY_PREFIX_CHARS: usize = 500;

/// Embedding cache keyed by a hash of the first `key_prefix_chars` characters
/// of the input text.
///
/// Two texts sharing the same prefix share an entry. Lookups and inserts take
/// a short lock; two requests missing on the same text both compute and the
/// second insert wins. A capacity of zero disables caching.
pub struct EmbeddingCache {
    key_prefix_chars: usize,
    inner: Option<Mutex<CacheInner>>,
}

struct CacheInner {
    entries: LruCache<u64, Vec<f32>>,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, key_prefix_chars: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|capacity| {
            Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            })
        });
        Self {
            key_prefix_chars,
            inner,
        }
    }

    fn key(&self, text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        for c in text.chars().take(self.key_prefix_chars) {
            c.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Look up an embedding, marking it as recently used.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let inner = self.inner.as_ref()?;
        let key = self.key(text);
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.entries.get(&key).cloned() {
            Some(vector) => {
                inner.hits += 1;
                Some(vector)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store an embedding, evicting the least recently used entry when full.
    pub fn insert(&self, text: &str, vector: Vec<f32>) {
        if let Some(inner) = &self.inner {
            let key = self.key(text);
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .put(key, vector);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| {
            inner.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        self.inner.as_ref().map_or((0, 0), |inner| {
            let inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            (inner.hits, inner.misses)
        })
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_KEY_PREFIX_CHARS)
    }
}
