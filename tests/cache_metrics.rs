use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use metrics_util::CompositeKey;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use penna::application::auth::{AdminSeed, AuthService, SessionPolicy};
use penna::cache::{CacheBackend, CacheConfig, CacheError, ContentCache, ListingKey, MemoryBackend};
use penna::domain::credentials::{CredentialStore, KdfParams};
use penna::domain::session::SessionTokenCodec;
use penna::infra::memory::InMemoryCredentials;
use serial_test::serial;

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

/// Counter totals keyed by `name{label=value,...}` with labels sorted.
fn counters(entries: &[(CompositeKey, DebugValue)]) -> HashMap<String, u64> {
    entries
        .iter()
        .filter_map(|(composite_key, value)| {
            let DebugValue::Counter(count) = value else {
                return None;
            };
            let key = composite_key.key();
            let mut labels: Vec<String> = key
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect();
            labels.sort();
            Some((format!("{}{{{}}}", key.name(), labels.join(",")), *count))
        })
        .collect()
}

fn memory_cache() -> ContentCache {
    let config = CacheConfig::default();
    ContentCache::new(
        Arc::new(MemoryBackend::new(config.capacity_non_zero())),
        &config,
    )
}

#[tokio::test]
#[serial]
async fn cache_and_login_paths_emit_expected_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    penna::infra::telemetry::describe_metrics();

    let cache = memory_cache();
    for _ in 0..3 {
        let listing: Result<Vec<i64>, CacheError> = cache
            .get_or_compute(&ListingKey::Main, || async { Ok(vec![3, 1]) })
            .await;
        assert_eq!(listing.expect("computed"), vec![3, 1]);
    }
    cache
        .invalidate(&ListingKey::Main)
        .await
        .expect("invalidated");

    let unreachable = ContentCache::new(Arc::new(UnreachableBackend), &CacheConfig::default());
    let served: Result<Vec<i64>, CacheError> = unreachable
        .get_or_compute(&ListingKey::Visits, || async { Ok(vec![7]) })
        .await;
    assert_eq!(served.expect("fails open"), vec![7]);
    assert!(unreachable.invalidate(&ListingKey::Visits).await.is_err());

    let auth = AuthService::new(
        Arc::new(InMemoryCredentials::default()),
        CredentialStore::new(KdfParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .expect("kdf params"),
        SessionTokenCodec::new(b"metrics-test signing secret").expect("codec"),
        SessionPolicy::default(),
    );
    auth.bootstrap_admin(&AdminSeed {
        username: "admin".to_string(),
        password: "password".to_string(),
    })
    .await
    .expect("seeded");
    assert!(auth.login("admin", "wrong-password").await.is_err());
    assert!(auth.login("nobody", "password").await.is_err());

    let entries: Vec<(CompositeKey, DebugValue)> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| (composite_key, value))
        .collect();
    let counters = counters(&entries);
    let expect = |name: &str, value: u64| {
        assert_eq!(
            counters.get(name).copied(),
            Some(value),
            "unexpected value for {name}; recorded: {counters:?}"
        );
    };

    expect("penna_cache_miss_total{listing=main}", 1);
    expect("penna_cache_hit_total{listing=main}", 2);
    expect("penna_cache_invalidate_total{listing=main,result=ok}", 1);
    expect("penna_cache_miss_total{listing=visits}", 1);
    expect("penna_cache_invalidate_total{listing=visits,result=error}", 1);
    expect("penna_login_failure_total{reason=wrong_password}", 1);
    expect("penna_login_failure_total{reason=unknown_user}", 1);
    assert!(
        counters
            .keys()
            .any(|name| name.starts_with("penna_cache_backend_error_total")),
        "backend errors not counted: {counters:?}"
    );

    assert!(entries.iter().any(|(composite_key, value)| {
        composite_key.key().name() == "penna_cache_compute_ms"
            && matches!(value, DebugValue::Histogram(samples) if !samples.is_empty())
    }));
}
