//! Shared key-value namespace behind the content cache.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {message}")]
    BackendUnavailable { message: String },
    #[error("cache value could not be encoded: {message}")]
    Encode { message: String },
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}

/// Byte-valued cache storage.
///
/// Implementations must make `set` atomic per key: a concurrent `get` sees
/// either the previous value, nothing, or the complete new value. Dropping
/// an entry at any time (eviction) is allowed and reads as a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError>;

    /// Remove `key`; removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
