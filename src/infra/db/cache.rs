//! Shared cache namespace in the `cache_entries` table, for deployments
//! where several nodes must see each other's invalidations.

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::{CacheBackend, CacheError};

use super::PostgresRepositories;
use super::util::map_cache_error;

#[derive(Clone)]
pub struct PostgresCacheBackend {
    repositories: PostgresRepositories,
}

impl PostgresCacheBackend {
    pub fn new(repositories: PostgresRepositories) -> Self {
        Self { repositories }
    }
}

#[async_trait]
impl CacheBackend for PostgresCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let value: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = $1")
                .bind(key)
                .fetch_optional(self.repositories.pool())
                .await
                .map_err(map_cache_error)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError> {
        // Single-statement upsert: readers see the old row or the new one.
        sqlx::query(
            "INSERT INTO cache_entries (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value.as_ref())
        .execute(self.repositories.pool())
        .await
        .map_err(map_cache_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(self.repositories.pool())
            .await
            .map_err(map_cache_error)?;
        Ok(())
    }
}
