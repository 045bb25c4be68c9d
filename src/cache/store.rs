//! In-process LRU cache backend.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::backend::{CacheBackend, CacheError};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Bounded in-memory backend; least recently used entries are evicted once
/// `capacity` is reached.
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        // Promotes the entry, so this needs the write half.
        Ok(rw_write(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }
}
