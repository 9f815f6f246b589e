//! Image namespace: blob reads and writes plus fetch-and-cache.

use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use coursecache_core::{Error, ImageBlob, ImageEntry};

use super::{CacheManager, logged};

impl CacheManager {
    /// Get a fresh cached image, using the default TTL.
    ///
    /// An expired image is deleted and reported as a miss.
    pub async fn get_image(&self, url: &str) -> Option<ImageBlob> {
        let store = self.store().await?;
        let entry = logged("get_image", store.get_image(url).await)??;

        if !self.is_valid(entry.timestamp, self.max_age) {
            tracing::debug!(url, "cached image expired");
            logged("delete_image", store.delete_image(url).await);
            return None;
        }

        Some(entry.blob)
    }

    /// Store an image, replacing any existing blob for the URL.
    pub async fn set_image(&self, url: &str, blob: ImageBlob) -> bool {
        let Some(store) = self.store().await else {
            return false;
        };
        let entry = ImageEntry { url: url.to_string(), blob, timestamp: self.now() };
        logged("set_image", store.put_image(&entry).await).is_some()
    }

    /// Delete a cached image. Returns whether one was removed.
    pub async fn delete_image(&self, url: &str) -> bool {
        let Some(store) = self.store().await else {
            return false;
        };
        logged("delete_image", store.delete_image(url).await).unwrap_or(false)
    }

    /// Make sure a fresh copy of the image at `url` is cached.
    ///
    /// Returns immediately if one already is; otherwise fetches and stores it.
    /// Fetch failures are returned to the caller, who normally treats this as
    /// best-effort background work.
    pub async fn cache_image(&self, url: &str) -> Result<(), Error> {
        if self.get_image(url).await.is_some() {
            tracing::debug!(url, "image already cached");
            return Ok(());
        }

        let blob = self.fetcher.fetch_image(url).await?;
        let bytes = blob.len();
        if self.set_image(url, blob).await {
            tracing::debug!(url, bytes, "image cached");
        }
        Ok(())
    }

    /// Cache every URL in `urls`, which may be a single string or an array.
    ///
    /// Non-string and empty entries are skipped. Returns how many images are
    /// cached afterwards; failures only count against the total.
    pub async fn preload_images(&self, urls: &Value) -> usize {
        let candidates: Vec<&str> = match urls {
            Value::String(url) => vec![url.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        self.preload_image_urls(candidates).await
    }

    /// Cache each URL concurrently, at most `preload_concurrency` at a time.
    ///
    /// Empty URLs are skipped. Returns the number of successes.
    pub async fn preload_image_urls<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let attempted = urls.len();

        let succeeded = stream::iter(urls)
            .map(|url| async move {
                match self.cache_image(&url).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "image preload failed");
                        false
                    }
                }
            })
            .buffer_unordered(self.preload_concurrency)
            .filter(|ok| std::future::ready(*ok))
            .count()
            .await;

        tracing::debug!(attempted, succeeded, "image preload finished");
        succeeded
    }
}
