//! HTTP image fetching.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 10MB (configurable)
//! - Non-2xx statuses are errors

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Url, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, canonicalize_with_base};

use coursecache_core::{AppConfig, Error, ImageBlob};

/// Source of image bodies for the cache.
///
/// The cache manager only needs "GET this URL and give me the body"; keeping
/// that behind a trait lets the manager run against a fake in tests.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the image at `url`, failing on transport errors and non-success statuses.
    async fn fetch_image(&self, url: &str) -> Result<ImageBlob, Error>;
}

/// Configuration for the HTTP image fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "course-cache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Origin that root-relative image paths are resolved against (default: none)
    pub base_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "course-cache/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            base_url: None,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_image_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            base_url: config.image_base_url.clone(),
        }
    }
}

/// reqwest-backed image fetcher.
pub struct HttpImageFetcher {
    http: Client,
    config: FetchConfig,
    base: Option<Url>,
}

impl HttpImageFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        let base = config
            .base_url
            .as_deref()
            .map(|b| canonicalize(b).map_err(|e| Error::InvalidUrl(format!("base URL {b}: {e}"))))
            .transpose()?;

        Ok(Self { http, config, base })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url_str: &str) -> Result<ImageBlob, Error> {
        let start = Instant::now();
        let url = canonicalize_with_base(url_str, self.base.as_ref()).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::FetchTimeout(format!("{url}: {e}"))
                } else {
                    Error::HttpError(format!("network error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("status {} for {}", status.as_u16(), url)));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let read_error = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("{url}: {e}"))
            } else {
                Error::HttpError(format!("failed to read response: {}", e))
            }
        };

        // Content-Length may be absent (chunked), so the cap is enforced while reading.
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(read_error)? {
            if bytes.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched image"
        );

        Ok(ImageBlob::new(bytes, content_type))
    }
}
