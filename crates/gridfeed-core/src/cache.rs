//! Response caching for proxied upstream calls.
//!
//! The store contract is deliberately forgiving: caching is best-effort
//! and never a correctness dependency. A failing `get` degrades to a miss
//! and a failing `put` is logged by the caller and swallowed.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::http_client::HttpMethod;

/// Compute the deterministic cache key for a proxied request.
///
/// Parameters arrive in a `BTreeMap`, so two requests that differ only in
/// parameter order canonicalize to the same `METHOD path?k=v&...` string
/// and therefore the same SHA-256 digest.
pub fn cache_key(method: HttpMethod, path: &str, params: &BTreeMap<String, String>) -> String {
    let mut canonical = format!("{} {}", method.as_str(), path);
    let mut first = true;
    for (name, value) in params {
        canonical.push(if first { '?' } else { '&' });
        first = false;
        canonical.push_str(name);
        canonical.push('=');
        canonical.push_str(value);
    }

    let digest = Sha256::digest(canonical.as_bytes());
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

/// Store-level failure. Never surfaced to callers of the proxy pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    message: String,
}

impl CacheError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CacheError {}

type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key/value store with explicit expiry.
///
/// `put` is an upsert; concurrent writers to the same key race and
/// last-write-wins is accepted. `get` must treat an expired entry as a
/// miss and may evict it lazily.
pub trait CacheStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

    fn put<'a>(&'a self, key: String, payload: String, ttl: Duration) -> CacheFuture<'a, ()>;

    /// Remove expired entries, returning how many were dropped.
    fn purge_expired<'a>(&'a self) -> CacheFuture<'a, u64>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryInner {
    map: HashMap<String, MemoryEntry>,
}

impl MemoryInner {
    fn get(&mut self, key: &str) -> Option<String> {
        match self.map.get(key) {
            Some(entry) if Instant::now() <= entry.expires_at => Some(entry.payload.clone()),
            Some(_) => {
                // Expired: lazily evict so the map does not grow unbounded.
                self.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&mut self, key: String, payload: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.map.insert(key, MemoryEntry { payload, expires_at });
    }

    fn purge_expired(&mut self) -> u64 {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, entry| entry.expires_at > now);
        (before - self.map.len()) as u64
    }
}

/// Thread-safe in-memory cache store.
///
/// Suitable for tests and single-instance deployments; durable shared
/// caching lives in `gridfeed-store`.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<tokio::sync::RwLock<MemoryInner>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            Ok(inner.get(key))
        })
    }

    fn put<'a>(&'a self, key: String, payload: String, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Ok(());
            }
            let mut inner = self.inner.write().await;
            inner.put(key, payload, ttl);
            Ok(())
        })
    }

    fn purge_expired<'a>(&'a self) -> CacheFuture<'a, u64> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            Ok(inner.purge_expired())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn cache_key_ignores_parameter_order() {
        let forward = params(&[("season", "2024"), ("week", "10")]);
        let reversed = params(&[("week", "10"), ("season", "2024")]);

        assert_eq!(
            cache_key(HttpMethod::Get, "/stats", &forward),
            cache_key(HttpMethod::Get, "/stats", &reversed)
        );
    }

    #[test]
    fn cache_key_distinguishes_paths_and_values() {
        let p = params(&[("season", "2024"), ("week", "10")]);
        let other_week = params(&[("season", "2024"), ("week", "11")]);

        assert_ne!(
            cache_key(HttpMethod::Get, "/stats", &p),
            cache_key(HttpMethod::Get, "/projections", &p)
        );
        assert_ne!(
            cache_key(HttpMethod::Get, "/stats", &p),
            cache_key(HttpMethod::Get, "/stats", &other_week)
        );
    }

    #[tokio::test]
    async fn memory_store_basic_operations() {
        let cache = MemoryCacheStore::new();

        assert_eq!(cache.get("key1").await.expect("get"), None);

        cache
            .put("key1".into(), "value1".into(), Duration::from_secs(5))
            .await
            .expect("put");
        assert_eq!(
            cache.get("key1").await.expect("get"),
            Some(String::from("value1"))
        );

        // Upsert overwrites.
        cache
            .put("key1".into(), "value2".into(), Duration::from_secs(5))
            .await
            .expect("put");
        assert_eq!(
            cache.get("key1").await.expect("get"),
            Some(String::from("value2"))
        );
    }

    #[tokio::test]
    async fn expired_read_is_a_miss_and_evicts() {
        let cache = MemoryCacheStore::new();

        cache
            .put("key1".into(), "value1".into(), Duration::from_millis(30))
            .await
            .expect("put");
        assert!(cache.get("key1").await.expect("get").is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("key1").await.expect("get"), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn zero_ttl_is_never_stored() {
        let cache = MemoryCacheStore::new();
        cache
            .put("key1".into(), "value1".into(), Duration::ZERO)
            .await
            .expect("put");
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn purge_expired_reports_dropped_entries() {
        let cache = MemoryCacheStore::new();
        cache
            .put("a".into(), "1".into(), Duration::from_millis(20))
            .await
            .expect("put");
        cache
            .put("b".into(), "2".into(), Duration::from_secs(60))
            .await
            .expect("put");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.purge_expired().await.expect("purge"), 1);
        assert_eq!(cache.len().await, 1);
    }
}
