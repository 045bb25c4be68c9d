//! Read-through listing cache with explicit invalidation.
//!
//! Values are stored as complete JSON documents under [`ListingKey`] names.
//! Reads fail open: a backend that cannot be reached costs a recompute, never
//! a failed page. Writes that must not be lost (`set`, `invalidate`) report
//! backend failures to the caller.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::backend::{CacheBackend, CacheError};
use super::config::CacheConfig;
use super::inflight::InFlightLeases;
use super::keys::ListingKey;

const SOURCE: &str = "cache::content";

const METRIC_CACHE_HIT_TOTAL: &str = "penna_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "penna_cache_miss_total";
const METRIC_CACHE_BACKEND_ERROR_TOTAL: &str = "penna_cache_backend_error_total";
const METRIC_CACHE_INVALIDATE_TOTAL: &str = "penna_cache_invalidate_total";
const METRIC_CACHE_COMPUTE_MS: &str = "penna_cache_compute_ms";

/// Write-side state of one key.
///
/// `epoch` is bumped by every overwrite or removal before the backend is
/// touched. Backend writes and deletes for the key run under `store`, and a
/// computed result is only written if the epoch it started from is still
/// current while `store` is held. An invalidation therefore either stops a
/// racing reader's store or removes it before returning.
#[derive(Default)]
struct KeySlot {
    epoch: AtomicU64,
    store: Mutex<()>,
}

pub struct ContentCache {
    backend: Arc<dyn CacheBackend>,
    leases: Option<InFlightLeases>,
    slots: DashMap<String, Arc<KeySlot>>,
}

impl ContentCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            leases: config.single_flight.then(InFlightLeases::new),
            slots: DashMap::new(),
        }
    }

    /// Return the cached value for `key`, or run `compute`, store its result
    /// and return it.
    ///
    /// `compute` runs at most once per call and not at all on a hit. Errors
    /// from `compute` are returned untouched and nothing is stored.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &ListingKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = key.to_string();
        if let Some(value) = self.read_through(key, &name).await {
            return Ok(value);
        }

        let _lease = match &self.leases {
            Some(leases) => {
                let lease = leases.acquire(&name).await;
                // The previous holder has usually filled the entry by now.
                if let Some(value) = self.read_through(key, &name).await {
                    return Ok(value);
                }
                Some(lease)
            }
            None => None,
        };

        counter!(METRIC_CACHE_MISS_TOTAL, "listing" => key.kind()).increment(1);
        let slot = self.slot(&name);
        let epoch = slot.epoch.load(Ordering::SeqCst);
        let started_at = Instant::now();
        let value = compute().await?;
        histogram!(METRIC_CACHE_COMPUTE_MS, "listing" => key.kind())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let _store = slot.store.lock().await;
        if slot.epoch.load(Ordering::SeqCst) != epoch {
            debug!(
                target_module = SOURCE,
                key = %name,
                "Listing changed during compute; result not stored"
            );
            return Ok(value);
        }

        if let Err(err) = self.write(&name, &value).await {
            self.record_failure(key, "store", &err);
        }
        Ok(value)
    }

    /// Raw read. Backend failures are returned; an undecodable entry reads
    /// as absent.
    pub async fn lookup<T>(&self, key: &ListingKey) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let name = key.to_string();
        let stored = self
            .backend
            .get(&name)
            .await
            .inspect_err(|err| self.record_failure(key, "lookup", err))?;

        Ok(stored.and_then(|bytes| decode(&name, &bytes)))
    }

    /// Unconditionally overwrite `key`.
    pub async fn set<T>(&self, key: &ListingKey, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let name = key.to_string();
        let slot = self.bump(&name);
        let _store = slot.store.lock().await;
        self.write(&name, value)
            .await
            .inspect_err(|err| self.record_failure(key, "set", err))
    }

    /// Remove `key` so the next read recomputes it.
    pub async fn invalidate(&self, key: &ListingKey) -> Result<(), CacheError> {
        let name = key.to_string();
        let slot = self.bump(&name);
        let _store = slot.store.lock().await;

        match self.backend.delete(&name).await {
            Ok(()) => {
                counter!(
                    METRIC_CACHE_INVALIDATE_TOTAL,
                    "listing" => key.kind(),
                    "result" => "ok"
                )
                .increment(1);
                debug!(target_module = SOURCE, key = %name, "Invalidated listing");
                Ok(())
            }
            Err(err) => {
                counter!(
                    METRIC_CACHE_INVALIDATE_TOTAL,
                    "listing" => key.kind(),
                    "result" => "error"
                )
                .increment(1);
                self.record_failure(key, "invalidate", &err);
                Err(err)
            }
        }
    }

    /// Recompute `key` and replace whatever is stored, hit or not.
    pub async fn force_refresh<T, E, F, Fut>(&self, key: &ListingKey, compute: F) -> Result<T, E>
    where
        T: Serialize,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = key.to_string();
        let _lease = match &self.leases {
            Some(leases) => Some(leases.acquire(&name).await),
            None => None,
        };

        let started_at = Instant::now();
        let value = compute().await?;
        histogram!(METRIC_CACHE_COMPUTE_MS, "listing" => key.kind())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        self.set(key, &value).await?;
        Ok(value)
    }

    async fn read_through<T>(&self, key: &ListingKey, name: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.backend.get(name).await {
            Ok(Some(bytes)) => {
                let value = decode(name, &bytes)?;
                counter!(METRIC_CACHE_HIT_TOTAL, "listing" => key.kind()).increment(1);
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                self.record_failure(key, "get", &err);
                None
            }
        }
    }

    async fn write<T>(&self, name: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let encoded =
            serde_json::to_vec(value).map_err(|err| CacheError::encode(err.to_string()))?;
        self.backend.set(name, Bytes::from(encoded)).await
    }

    fn slot(&self, name: &str) -> Arc<KeySlot> {
        Arc::clone(self.slots.entry(name.to_string()).or_default().value())
    }

    fn bump(&self, name: &str) -> Arc<KeySlot> {
        let slot = self.slot(name);
        slot.epoch.fetch_add(1, Ordering::SeqCst);
        slot
    }

    fn record_failure(&self, key: &ListingKey, op: &'static str, err: &CacheError) {
        if matches!(err, CacheError::BackendUnavailable { .. }) {
            counter!(METRIC_CACHE_BACKEND_ERROR_TOTAL, "op" => op).increment(1);
        }
        warn!(
            target_module = SOURCE,
            op,
            key = %key,
            error = %err,
            "Cache backend operation failed"
        );
    }
}

fn decode<T>(name: &str, bytes: &[u8]) -> Option<T>
where
    T: DeserializeOwned,
{
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                target_module = SOURCE,
                key = %name,
                error = %err,
                "Discarding undecodable cache entry"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::cache::store::MemoryBackend;

    struct UnreachableBackend;

    #[async_trait]
    impl CacheBackend for UnreachableBackend {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn set(&self, _key: &str, _value: Bytes) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    fn memory_cache(single_flight: bool) -> (Arc<MemoryBackend>, ContentCache) {
        let config = CacheConfig {
            single_flight,
            ..CacheConfig::default()
        };
        let backend = Arc::new(MemoryBackend::new(config.capacity_non_zero()));
        let cache = ContentCache::new(backend.clone(), &config);
        (backend, cache)
    }

    async fn compute_counted(calls: &AtomicUsize, value: Vec<i64>) -> Result<Vec<i64>, CacheError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn hit_skips_compute() {
        let (_, cache) = memory_cache(true);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(&ListingKey::Main, || compute_counted(&calls, vec![3, 2, 1]))
            .await
            .expect("computed");
        let second = cache
            .get_or_compute(&ListingKey::Main, || compute_counted(&calls, vec![9]))
            .await
            .expect("cached");

        assert_eq!(first, vec![3, 2, 1]);
        assert_eq!(second, vec![3, 2, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let (_, cache) = memory_cache(true);
        let calls = AtomicUsize::new(0);

        cache
            .get_or_compute(&ListingKey::Main, || compute_counted(&calls, vec![1]))
            .await
            .expect("computed");
        cache.invalidate(&ListingKey::Main).await.expect("invalidated");
        let refreshed = cache
            .get_or_compute(&ListingKey::Main, || compute_counted(&calls, vec![2, 1]))
            .await
            .expect("recomputed");

        assert_eq!(refreshed, vec![2, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn compute_error_is_returned_and_not_stored() {
        let (backend, cache) = memory_cache(true);
        let result: Result<Vec<i64>, &str> = cache
            .get_or_compute(&ListingKey::Visits, || async { Err("query failed") })
            .await;

        assert_eq!(result, Err("query failed"));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_is_treated_as_a_miss_and_overwritten() {
        let (backend, cache) = memory_cache(true);
        backend
            .set("listing:main", Bytes::from_static(b"{not json"))
            .await
            .expect("seeded");
        let calls = AtomicUsize::new(0);

        let value = cache
            .get_or_compute(&ListingKey::Main, || compute_counted(&calls, vec![5]))
            .await
            .expect("recomputed");

        assert_eq!(value, vec![5]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.lookup::<Vec<i64>>(&ListingKey::Main).await,
            Ok(Some(vec![5]))
        );
    }

    #[tokio::test]
    async fn unreachable_backend_fails_open_on_reads() {
        let cache = ContentCache::new(Arc::new(UnreachableBackend), &CacheConfig::default());
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute(&ListingKey::Main, || compute_counted(&calls, vec![1]))
                .await
                .expect("content still served");
            assert_eq!(value, vec![1]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(matches!(
            cache.lookup::<Vec<i64>>(&ListingKey::Main).await,
            Err(CacheError::BackendUnavailable { .. })
        ));
        assert!(matches!(
            cache.invalidate(&ListingKey::Main).await,
            Err(CacheError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn set_and_force_refresh_overwrite_unconditionally() {
        let (_, cache) = memory_cache(true);
        cache.set(&ListingKey::Visits, &vec![1_i64]).await.expect("set");
        assert_eq!(
            cache.lookup::<Vec<i64>>(&ListingKey::Visits).await,
            Ok(Some(vec![1]))
        );

        let calls = AtomicUsize::new(0);
        let refreshed = cache
            .force_refresh(&ListingKey::Visits, || compute_counted(&calls, vec![4, 1]))
            .await
            .expect("refreshed");
        assert_eq!(refreshed, vec![4, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.lookup::<Vec<i64>>(&ListingKey::Visits).await,
            Ok(Some(vec![4, 1]))
        );
    }

    #[tokio::test]
    async fn invalidation_during_compute_discards_the_stale_result() {
        let (_, cache) = memory_cache(true);

        let value = cache
            .get_or_compute(&ListingKey::Main, || async {
                // A writer lands while this reader is still querying.
                cache.invalidate(&ListingKey::Main).await?;
                Ok::<_, CacheError>(vec![1_i64])
            })
            .await
            .expect("computed");

        assert_eq!(value, vec![1]);
        assert_eq!(cache.lookup::<Vec<i64>>(&ListingKey::Main).await, Ok(None));
    }

    /// Backend whose writes take a while to land.
    struct SlowSetBackend {
        inner: MemoryBackend,
        delay: Duration,
    }

    #[async_trait]
    impl CacheBackend for SlowSetBackend {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }
    }

    async fn invalidate_during_slow_store(single_flight: bool) {
        let config = CacheConfig {
            single_flight,
            ..CacheConfig::default()
        };
        let backend = SlowSetBackend {
            inner: MemoryBackend::new(config.capacity_non_zero()),
            delay: Duration::from_millis(50),
        };
        let cache = Arc::new(ContentCache::new(Arc::new(backend), &config));

        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_compute(&ListingKey::Main, || async {
                        Ok::<_, CacheError>(vec!["old".to_string()])
                    })
                    .await
            })
        };

        // The reader has computed and is inside its backend write.
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&ListingKey::Main).await.expect("invalidated");

        let next = cache
            .get_or_compute(&ListingKey::Main, || async {
                Ok::<_, CacheError>(vec!["new".to_string()])
            })
            .await
            .expect("recomputed");
        assert_eq!(next, vec!["new".to_string()]);

        assert_eq!(
            reader.await.expect("reader completes"),
            Ok(vec!["old".to_string()])
        );
        assert_eq!(
            cache.lookup::<Vec<String>>(&ListingKey::Main).await,
            Ok(Some(vec!["new".to_string()]))
        );
    }

    #[tokio::test]
    async fn invalidation_removes_a_store_still_in_flight() {
        invalidate_during_slow_store(true).await;
    }

    #[tokio::test]
    async fn invalidation_removes_a_store_still_in_flight_without_single_flight() {
        invalidate_during_slow_store(false).await;
    }

    #[tokio::test]
    async fn single_flight_computes_once_for_concurrent_misses() {
        let (_, cache) = memory_cache(true);
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&ListingKey::Main, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, CacheError>(vec![7_i64])
                    })
                    .await
            }));
        }

        for task in tasks {
            let value = task.await.expect("task completes").expect("value");
            assert_eq!(value, vec![7]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn without_single_flight_concurrent_misses_each_compute() {
        let (_, cache) = memory_cache(false);
        let cache = Arc::new(cache);
        let callers = 4;
        // Every compute waits for all of the others, which only completes if
        // they run concurrently.
        let barrier = Arc::new(Barrier::new(callers));

        let mut tasks = Vec::new();
        for _ in 0..callers {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&ListingKey::Main, || async {
                        barrier.wait().await;
                        Ok::<_, CacheError>(vec![7_i64])
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.expect("task completes"), Ok(vec![7]));
        }
    }
}
