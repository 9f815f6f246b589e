//! Read-through caching for arbitrary async fetches.
//!
//! 1. Check cache - if fresh, return immediately
//! 2. If stale/missing, call the fetch function
//! 3. On success, store the result and return it
//! 4. On failure, return the cached value even if expired, else the original error
//!
//! The first lookup does not delete an expired entry; it keeps it in hand so
//! step 4 can still serve it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use coursecache_core::{ApiEntry, Params};

use crate::manager::CacheManager;

/// Per-call cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Bypass the cache entirely: no read, no write.
    pub skip_cache: bool,
    /// Skip the cache read but still store the fresh result.
    pub force_refresh: bool,
    /// TTL for the read; the manager's default when `None`.
    pub max_age: Option<Duration>,
}

impl CallOptions {
    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Call `fetch` through the cache for `(endpoint, params)`.
///
/// Errors from `fetch` are returned unchanged unless a cached value (fresh or
/// not) exists to fall back on. Cache failures never surface here.
pub async fn cached_api_call<T, E, F, Fut>(
    manager: &CacheManager, endpoint: &str, params: &Params, fetch: F, options: CallOptions,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if options.skip_cache {
        return fetch().await;
    }

    let max_age = options.max_age.unwrap_or_else(|| manager.max_age());

    let mut stale = None;
    if !options.force_refresh
        && let Some(entry) = manager.peek_api(endpoint, params).await
    {
        if manager.is_valid(entry.timestamp, max_age)
            && let Some(value) = decode::<T>(&entry)
        {
            tracing::debug!(endpoint, "serving cached response");
            return Ok(value);
        }
        stale = Some(entry);
    }

    match fetch().await {
        Ok(value) => {
            match serde_json::to_value(&value) {
                Ok(data) => {
                    manager.set_api(endpoint, params, data).await;
                }
                Err(e) => tracing::warn!(endpoint, error = %e, "response not cacheable"),
            }
            Ok(value)
        }
        Err(err) => {
            let fallback = match stale {
                Some(entry) => Some(entry),
                None => manager.peek_api(endpoint, params).await,
            };

            match fallback.as_ref().and_then(decode::<T>) {
                Some(value) => {
                    tracing::warn!(endpoint, error = %err, "fetch failed; serving stale cached response");
                    Ok(value)
                }
                None => Err(err),
            }
        }
    }
}

fn decode<T: DeserializeOwned>(entry: &ApiEntry) -> Option<T> {
    serde_json::from_value(entry.data.clone())
        .inspect_err(|e| tracing::debug!(key = %entry.key, error = %e, "cached payload does not match requested type"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{HOUR_MS, manager_with_clock, params, unavailable_manager};
    use coursecache_core::Clock;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ContactInfo {
        email: String,
        phone: String,
    }

    fn contact() -> ContactInfo {
        ContactInfo { email: "hello@example.com".into(), phone: "+1 555 0100".into() }
    }

    async fn ok_fetch(calls: &AtomicUsize, value: Value) -> Result<Value, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    async fn failing_fetch(calls: &AtomicUsize) -> Result<Value, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("backend down".to_string())
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let (manager, _) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = params(json!({"page": "about"}));

        let fetch = || ok_fetch(&calls, json!({"v": 1}));
        let value = cached_api_call(&manager, "/api/legal", &p, fetch, CallOptions::default()).await.unwrap();

        assert_eq!(value, json!({"v": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_api("/api/legal", &p).await, Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let (manager, _) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/x", &p, json!({"v": 1})).await;

        let value = cached_api_call(&manager, "/x", &p, || ok_fetch(&calls, json!({"v": 2})), CallOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!({"v": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_typed_payload_roundtrip() {
        let (manager, _) = manager_with_clock();
        let p = Params::new();

        let fetch = || async { Ok::<_, String>(contact()) };
        let first: ContactInfo =
            cached_api_call(&manager, "/api/contact", &p, fetch, CallOptions::default()).await.unwrap();
        let second: ContactInfo = cached_api_call(
            &manager,
            "/api/contact",
            &p,
            || async { Err::<ContactInfo, _>("should not be called".to_string()) },
            CallOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(first, contact());
        assert_eq!(second, contact());
    }

    #[tokio::test]
    async fn test_mismatched_cached_type_is_treated_as_miss() {
        let (manager, _) = manager_with_clock();
        let p = Params::new();
        manager.set_api("/api/contact", &p, json!("not a contact")).await;

        let fetch = || async { Ok::<_, String>(contact()) };
        let value: ContactInfo =
            cached_api_call(&manager, "/api/contact", &p, fetch, CallOptions::default()).await.unwrap();

        assert_eq!(value, contact());
        let stored = manager.peek_api("/api/contact", &p).await.unwrap();
        assert_eq!(stored.data, serde_json::to_value(contact()).unwrap());
    }

    #[tokio::test]
    async fn test_stale_fallback_serves_expired_entry() {
        let (manager, clock) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/x", &p, json!({"v": 1})).await;

        clock.advance(25 * HOUR_MS);
        let value = cached_api_call(&manager, "/x", &p, || failing_fetch(&calls), CallOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!({"v": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The expired entry is kept for future fallbacks.
        assert!(manager.peek_api("/x", &p).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_refreshed_on_success() {
        let (manager, clock) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/x", &p, json!({"v": 1})).await;

        clock.advance(25 * HOUR_MS);
        let value = cached_api_call(&manager, "/x", &p, || ok_fetch(&calls, json!({"v": 2})), CallOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!({"v": 2}));
        let entry = manager.peek_api("/x", &p).await.unwrap();
        assert_eq!(entry.data, json!({"v": 2}));
        assert_eq!(entry.timestamp, clock.now_ms());
    }

    #[tokio::test]
    async fn test_failure_without_cache_propagates_original_error() {
        let (manager, _) = manager_with_clock();
        let calls = AtomicUsize::new(0);

        let err = cached_api_call(&manager, "/x", &Params::new(), || failing_fetch(&calls), CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, "backend down");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_cache_bypasses_read_and_write() {
        let (manager, clock) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/y", &p, json!({"v": "seeded"})).await;
        let seeded = manager.peek_api("/y", &p).await.unwrap();

        clock.advance(1_000);
        let value = cached_api_call(
            &manager,
            "/y",
            &p,
            || ok_fetch(&calls, json!({"v": "fresh"})),
            CallOptions::default().skip_cache(),
        )
        .await
        .unwrap();

        assert_eq!(value, json!({"v": "fresh"}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.peek_api("/y", &p).await.unwrap(), seeded);
    }

    #[tokio::test]
    async fn test_skip_cache_does_not_fall_back() {
        let (manager, _) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/y", &p, json!(1)).await;

        let result =
            cached_api_call(&manager, "/y", &p, || failing_fetch(&calls), CallOptions::default().skip_cache()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_force_refresh_skips_read_but_writes() {
        let (manager, _) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/z", &p, json!({"v": 1})).await;

        let value = cached_api_call(
            &manager,
            "/z",
            &p,
            || ok_fetch(&calls, json!({"v": 2})),
            CallOptions::default().force_refresh(),
        )
        .await
        .unwrap();

        assert_eq!(value, json!({"v": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_api("/z", &p).await, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_force_refresh_failure_falls_back_to_cache() {
        let (manager, _) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/z", &p, json!({"v": 1})).await;

        let options = CallOptions::default().force_refresh();
        let value = cached_api_call(&manager, "/z", &p, || failing_fetch(&calls), options).await.unwrap();

        assert_eq!(value, json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_max_age_option_is_honored() {
        let (manager, clock) = manager_with_clock();
        let calls = AtomicUsize::new(0);
        let p = Params::new();
        manager.set_api("/m", &p, json!({"v": 1})).await;
        clock.advance(2 * 60 * 1000);

        // Within the 24h default, but older than the requested one minute.
        let value = cached_api_call(
            &manager,
            "/m",
            &p,
            || ok_fetch(&calls, json!({"v": 2})),
            CallOptions::default().with_max_age(Duration::from_secs(60)),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"v": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A longer max age than the default keeps a 25h-old entry fresh.
        clock.advance(25 * HOUR_MS);
        let value = cached_api_call(
            &manager,
            "/m",
            &p,
            || ok_fetch(&calls, json!({"v": 3})),
            CallOptions::default().with_max_age(Duration::from_secs(48 * 60 * 60)),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"v": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_passes_fetch_result_through() {
        let manager = unavailable_manager();
        let calls = AtomicUsize::new(0);
        let p = params(json!({"lang": "en"}));
        let endpoint = "/api/content/settings";

        let fetched = json!({"v": 1});
        let value = cached_api_call(&manager, endpoint, &p, || ok_fetch(&calls, fetched), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({"v": 1}));

        let err = cached_api_call(&manager, endpoint, &p, || failing_fetch(&calls), CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, "backend down");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!manager.is_available().await);
    }

    #[tokio::test]
    async fn test_call_options_builders() {
        let options = CallOptions::default().skip_cache().force_refresh().with_max_age(Duration::from_secs(5));
        assert!(options.skip_cache);
        assert!(options.force_refresh);
        assert_eq!(options.max_age, Some(Duration::from_secs(5)));
        assert_eq!(CallOptions::default().max_age, None);
    }
}
