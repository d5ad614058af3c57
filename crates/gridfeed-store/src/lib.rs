//! # Gridfeed Store
//!
//! DuckDB-backed durable storage for the gridfeed proxy.
//!
//! ## Overview
//!
//! Two tables back the proxy's shared state:
//!
//! | Table | Description |
//! |-------|-------------|
//! | `proxy_cache` | TTL cache keyed by the deterministic request hash |
//! | `api_metrics` | Append-only log of request outcomes |
//!
//! Cache and metrics are the only state intended to be shared across proxy
//! instances; circuit-breaker state deliberately stays in process memory
//! (see DESIGN.md).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridfeed_store::{ProxyStore, StoreConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ProxyStore::open_default()?;
//!     println!("store at {}", store.db_path().display());
//!     Ok(())
//! }
//! ```

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use gridfeed_core::cache::{CacheError, CacheStore};
use gridfeed_core::metrics::{ApiMetric, MetricsError, MetricsRecorder, MetricsSummary};
use gridfeed_core::UtcDateTime;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for the proxy store database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for gridfeed data.
    pub gridfeed_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of connections in the pool.
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let gridfeed_home = resolve_gridfeed_home();
        let db_path = gridfeed_home.join("proxy.duckdb");
        Self {
            gridfeed_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Durable cache + metrics store shared across proxy instances.
#[derive(Clone)]
pub struct ProxyStore {
    manager: DuckDbConnectionManager,
}

impl ProxyStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let store = Self { manager };
        store.initialize()?;
        Ok(store)
    }

    /// Initialize database schema. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Handle implementing the core [`CacheStore`] contract.
    pub fn cache(self: &Arc<Self>) -> DuckDbCacheStore {
        DuckDbCacheStore {
            store: Arc::clone(self),
        }
    }

    /// Handle implementing the core [`MetricsRecorder`] contract.
    pub fn metrics(self: &Arc<Self>) -> DuckDbMetricsRecorder {
        DuckDbMetricsRecorder {
            store: Arc::clone(self),
        }
    }

    fn cache_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let connection = self.manager.acquire()?;
        let now = UtcDateTime::now().unix_timestamp();

        let row: Option<(String, i64)> = connection
            .query_row(
                "SELECT payload, expires_at FROM proxy_cache WHERE key = ?",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|error| match error {
                ::duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match row {
            Some((payload, expires_at)) if expires_at > now => Ok(Some(payload)),
            Some(_) => {
                // Expired entry reads as a miss and is evicted lazily.
                connection.execute("DELETE FROM proxy_cache WHERE key = ?", [key])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn cache_put(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let connection = self.manager.acquire()?;
        let now = UtcDateTime::now().unix_timestamp();
        let expires_at = now + ttl.as_secs() as i64;

        connection.execute(
            "INSERT OR REPLACE INTO proxy_cache (key, payload, created_at, expires_at) \
             VALUES (?, ?, ?, ?)",
            ::duckdb::params![key, payload, now, expires_at],
        )?;
        Ok(())
    }

    fn cache_purge_expired(&self) -> Result<u64, StoreError> {
        let connection = self.manager.acquire()?;
        let now = UtcDateTime::now().unix_timestamp();
        let dropped = connection.execute(
            "DELETE FROM proxy_cache WHERE expires_at <= ?",
            ::duckdb::params![now],
        )?;
        Ok(dropped as u64)
    }

    fn metrics_record(&self, metric: &ApiMetric) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        let provider = metric.provider.map(|provider| provider.as_str());
        connection.execute(
            "INSERT INTO api_metrics \
             (endpoint, status, cache_hit, latency_ms, error, provider, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
            ::duckdb::params![
                metric.endpoint.as_str(),
                metric.status.map(i64::from),
                metric.cache_hit,
                metric.latency_ms as i64,
                metric.error.as_deref(),
                provider,
            ],
        )?;
        Ok(())
    }

    fn metrics_summary(&self, window: Duration) -> Result<MetricsSummary, StoreError> {
        let connection = self.manager.acquire()?;
        let window_secs = window.as_secs();

        let (total, hits, errors, avg_latency): (i64, i64, i64, Option<f64>) = connection
            .query_row(
                "SELECT COUNT(*), \
                        COALESCE(SUM(CASE WHEN cache_hit THEN 1 ELSE 0 END), 0), \
                        COALESCE(SUM(CASE WHEN error IS NOT NULL THEN 1 ELSE 0 END), 0), \
                        AVG(latency_ms) \
                 FROM api_metrics \
                 WHERE epoch(recorded_at) >= epoch(CURRENT_TIMESTAMP) - ?",
                ::duckdb::params![window_secs as i64],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                    ))
                },
            )?;

        Ok(MetricsSummary {
            window_secs,
            total_requests: total.max(0) as u64,
            cache_hits: hits.max(0) as u64,
            errors: errors.max(0) as u64,
            avg_latency_ms: avg_latency.unwrap_or(0.0).max(0.0) as u64,
        })
    }
}

/// [`CacheStore`] backed by the `proxy_cache` table.
#[derive(Clone)]
pub struct DuckDbCacheStore {
    store: Arc<ProxyStore>,
}

impl CacheStore for DuckDbCacheStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Option<String>, CacheError>> + Send + 'a>>
    {
        let result = self
            .store
            .cache_get(key)
            .map_err(|error| CacheError::new(error.to_string()));
        Box::pin(async move { result })
    }

    fn put<'a>(
        &'a self,
        key: String,
        payload: String,
        ttl: Duration,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), CacheError>> + Send + 'a>> {
        let result = self
            .store
            .cache_put(&key, &payload, ttl)
            .map_err(|error| CacheError::new(error.to_string()));
        Box::pin(async move { result })
    }

    fn purge_expired<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<u64, CacheError>> + Send + 'a>> {
        let result = self
            .store
            .cache_purge_expired()
            .map_err(|error| CacheError::new(error.to_string()));
        Box::pin(async move { result })
    }
}

/// [`MetricsRecorder`] backed by the append-only `api_metrics` table.
#[derive(Clone)]
pub struct DuckDbMetricsRecorder {
    store: Arc<ProxyStore>,
}

impl MetricsRecorder for DuckDbMetricsRecorder {
    fn record<'a>(
        &'a self,
        metric: ApiMetric,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), MetricsError>> + Send + 'a>> {
        let result = self.store.metrics_record(&metric).map_err(|error| {
            warn!(error = %error, "durable metrics insert failed");
            MetricsError::new(error.to_string())
        });
        Box::pin(async move { result })
    }

    fn summary<'a>(
        &'a self,
        window: Duration,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<MetricsSummary, MetricsError>> + Send + 'a>>
    {
        let result = self
            .store
            .metrics_summary(window)
            .map_err(|error| MetricsError::new(error.to_string()));
        Box::pin(async move { result })
    }
}

/// Resolve the gridfeed home directory from environment or default.
fn resolve_gridfeed_home() -> PathBuf {
    if let Some(path) = env::var_os("GRIDFEED_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".gridfeed");
    }

    PathBuf::from(".gridfeed")
}
