//! Fakes shared by the manager and cached-call tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use coursecache_core::{Clock, Error, ImageBlob, Params, StoreLocation};

use crate::fetch::ImageFetcher;
use crate::manager::CacheManager;

pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// 2024-01-01T00:00:00Z
const START_MS: i64 = 1_704_067_200_000;

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now_ms)))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Image fetcher that records every request and never touches the network.
#[derive(Default)]
pub struct RecordingFetcher {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingFetcher {
    pub fn failing<const N: usize>(urls: [&str; N]) -> Self {
        Self { failing: urls.iter().map(|u| u.to_string()).collect(), ..Default::default() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for RecordingFetcher {
    async fn fetch_image(&self, url: &str) -> Result<ImageBlob, Error> {
        self.calls.lock().unwrap().push(url.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(Error::HttpError(format!("status 404 for {url}")));
        }
        Ok(ImageBlob::new(format!("image:{url}").into_bytes(), Some("image/png".to_string())))
    }
}

/// In-memory manager on a manual clock, with a recording fetcher nobody inspects.
pub fn manager_with_clock() -> (CacheManager, ManualClock) {
    manager_with_fetcher(Arc::new(RecordingFetcher::default()))
}

/// In-memory manager on a manual clock using `fetcher`.
pub fn manager_with_fetcher(fetcher: Arc<RecordingFetcher>) -> (CacheManager, ManualClock) {
    let clock = ManualClock::new(START_MS);
    let manager = CacheManager::new(StoreLocation::Memory, fetcher).with_clock(Arc::new(clock.clone()));
    (manager, clock)
}

/// Build params from a JSON object literal.
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Manager whose store path cannot be opened, so it runs without persistence.
pub fn unavailable_manager() -> CacheManager {
    CacheManager::new(
        StoreLocation::File("/nonexistent-course-cache-dir/nested/cache.sqlite".into()),
        Arc::new(RecordingFetcher::default()),
    )
}
