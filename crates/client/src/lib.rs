//! Cache manager and read-through call wrapper for course-cache.
//!
//! This crate layers caching policy over the store in `coursecache-core`:
//! TTL checks, image fetch-and-cache over HTTP, and stale fallback for
//! arbitrary async fetches.

pub mod cached_call;
pub mod fetch;
pub mod manager;

#[cfg(test)]
mod test_support;

pub use cached_call::{CallOptions, cached_api_call};
pub use fetch::{FetchConfig, HttpImageFetcher, ImageFetcher};
pub use manager::{CacheManager, CacheStats};
