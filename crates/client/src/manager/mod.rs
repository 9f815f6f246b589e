//! The cache manager: sole reader and writer of the cache store.
//!
//! Every public method here is infallible from the caller's point of view.
//! Store errors are logged and collapse to a miss (reads), `false` (writes) or
//! zero (counts), because the cache must never be the reason a request fails.
//! The one exception is [`CacheManager::cache_image`], whose whole purpose is
//! the network call and which therefore reports fetch failures.

mod images;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use coursecache_core::cache::metadata::LAST_SWEEP_AT;
use coursecache_core::clock::{self, expiry_cutoff};
use coursecache_core::{
    ApiEntry, AppConfig, CacheDb, Clock, DEFAULT_MAX_AGE, Error, Params, StoreLocation, SystemClock, generate_key,
};

use crate::fetch::{FetchConfig, HttpImageFetcher, ImageFetcher};

/// Default number of concurrent fetches during a preload.
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 8;

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// API entries in the store.
    pub total: u64,
    /// API entries still within the default TTL.
    pub valid: u64,
    /// API entries past the default TTL but not yet removed.
    pub expired: u64,
    /// Cached images.
    pub images: u64,
    /// When `clear_expired` last ran, in epoch milliseconds.
    pub last_sweep_at: Option<i64>,
}

/// Read-through cache over the SQLite store, with image fetch-and-cache.
///
/// Construct one at startup and share it (by reference or `Arc`) with the
/// data-loading layer. The database is opened on first use; concurrent first
/// callers all wait on the same open attempt.
pub struct CacheManager {
    location: StoreLocation,
    store: OnceCell<Option<CacheDb>>,
    fetcher: Arc<dyn ImageFetcher>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    preload_concurrency: usize,
}

impl CacheManager {
    /// Create a manager for the store at `location`, fetching images with `fetcher`.
    pub fn new(location: StoreLocation, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            location,
            store: OnceCell::new(),
            fetcher,
            clock: Arc::new(SystemClock),
            max_age: DEFAULT_MAX_AGE,
            preload_concurrency: DEFAULT_PRELOAD_CONCURRENCY,
        }
    }

    /// Build a manager from application configuration with an HTTP image fetcher.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let fetcher = HttpImageFetcher::new(FetchConfig::from(config))?;
        Ok(Self::new(config.store_location(), Arc::new(fetcher))
            .with_max_age(config.max_age())
            .with_preload_concurrency(config.preload_concurrency))
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the default time-to-live.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Bound the number of concurrent fetches during a preload (at least 1).
    pub fn with_preload_concurrency(mut self, limit: usize) -> Self {
        self.preload_concurrency = limit.max(1);
        self
    }

    /// Default time-to-live applied when a read does not specify one.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Derive the cache key for an endpoint and its parameters.
    pub fn generate_key(&self, endpoint: &str, params: &Params) -> String {
        generate_key(endpoint, params)
    }

    /// Whether an entry written at `timestamp` is still fresh for `max_age`.
    pub fn is_valid(&self, timestamp: i64, max_age: Duration) -> bool {
        clock::is_valid(timestamp, max_age, self.now())
    }

    /// Whether the backing store opened successfully.
    pub async fn is_available(&self) -> bool {
        self.store().await.is_some()
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    async fn store(&self) -> Option<&CacheDb> {
        self.store
            .get_or_init(|| async {
                match self.location.open().await {
                    Ok(db) => {
                        tracing::debug!(location = ?self.location, "cache store opened");
                        Some(db)
                    }
                    Err(e) => {
                        tracing::warn!(
                            location = ?self.location,
                            error = %e,
                            "cache store unavailable; continuing without persistence"
                        );
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Get a fresh cached response, using the default TTL.
    ///
    /// An expired entry is deleted and reported as a miss.
    pub async fn get_api(&self, endpoint: &str, params: &Params) -> Option<Value> {
        self.get_api_with_max_age(endpoint, params, self.max_age).await
    }

    /// Get a fresh cached response for an explicit TTL.
    pub async fn get_api_with_max_age(&self, endpoint: &str, params: &Params, max_age: Duration) -> Option<Value> {
        let store = self.store().await?;
        let key = generate_key(endpoint, params);
        let entry = logged("get_api", store.get_api(&key).await)??;

        if !self.is_valid(entry.timestamp, max_age) {
            tracing::debug!(key = %key, "cache entry expired");
            logged("delete_api", store.delete_api(&key).await);
            return None;
        }

        tracing::debug!(key = %key, "cache hit");
        Some(entry.data)
    }

    /// Get the stored entry regardless of its age, without side effects.
    ///
    /// This is the lookup behind stale fallback: an expired entry is still
    /// better than nothing when the authoritative fetch has failed.
    pub async fn peek_api(&self, endpoint: &str, params: &Params) -> Option<ApiEntry> {
        let store = self.store().await?;
        logged("peek_api", store.get_api(&generate_key(endpoint, params)).await)?
    }

    /// Store a response, replacing any entry for the same key.
    ///
    /// Returns whether the entry was persisted.
    pub async fn set_api(&self, endpoint: &str, params: &Params, data: Value) -> bool {
        let Some(store) = self.store().await else {
            return false;
        };
        let entry = ApiEntry::new(endpoint, params.clone(), data, self.now());
        let stored = logged("set_api", store.put_api(&entry).await).is_some();
        if stored {
            tracing::debug!(key = %entry.key, "cache write");
        }
        stored
    }

    /// Delete one entry by exact key. Returns whether an entry was removed.
    pub async fn delete_api(&self, key: &str) -> bool {
        let Some(store) = self.store().await else {
            return false;
        };
        logged("delete_api", store.delete_api(key).await).unwrap_or(false)
    }

    /// Delete every entry whose endpoint contains `pattern`.
    ///
    /// Returns the number of entries removed.
    pub async fn clear_api_by_endpoint(&self, pattern: &str) -> u64 {
        let Some(store) = self.store().await else {
            return 0;
        };
        let deleted = logged("clear_api_by_endpoint", store.purge_api_by_endpoint(pattern).await).unwrap_or(0);
        tracing::info!(pattern, deleted, "invalidated cached responses by endpoint");
        deleted
    }

    /// Delete every API entry past the default TTL.
    ///
    /// Safe to call at any time; returns the number of entries removed.
    pub async fn clear_expired(&self) -> u64 {
        let Some(store) = self.store().await else {
            return 0;
        };
        let now = self.now();
        let deleted =
            logged("clear_expired", store.purge_api_older_than(expiry_cutoff(self.max_age, now)).await).unwrap_or(0);
        logged("record_sweep", store.put_meta(LAST_SWEEP_AT, &now.to_string(), now).await);
        tracing::info!(deleted, "swept expired cache entries");
        deleted
    }

    /// Empty both the API and image namespaces.
    pub async fn clear_all(&self) -> bool {
        let Some(store) = self.store().await else {
            return false;
        };
        let cleared = logged("clear_all", store.clear_all().await).is_some();
        if cleared {
            tracing::info!("cleared all cached responses and images");
        }
        cleared
    }

    /// Count API entries by freshness, plus images and the last sweep time.
    pub async fn get_stats(&self) -> CacheStats {
        let Some(store) = self.store().await else {
            return CacheStats::default();
        };
        let counts = logged("get_stats", store.count_api(expiry_cutoff(self.max_age, self.now())).await)
            .unwrap_or_default();
        let images = logged("count_images", store.count_images().await).unwrap_or(0);
        let last_sweep_at = logged("get_meta", store.get_meta(LAST_SWEEP_AT).await)
            .flatten()
            .and_then(|v| v.parse().ok());

        CacheStats {
            total: counts.total,
            valid: counts.total.saturating_sub(counts.expired),
            expired: counts.expired,
            images,
            last_sweep_at,
        }
    }
}

/// Log a store error and collapse it to `None`.
pub(crate) fn logged<T>(op: &'static str, result: Result<T, Error>) -> Option<T> {
    result.inspect_err(|e| tracing::warn!(op, error = %e, "cache store operation failed")).ok()
}
