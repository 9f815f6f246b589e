//! SQLite-backed store for cached API responses and images.
//!
//! This module provides a persistent cache using SQLite with async access via
//! tokio-rusqlite. It holds three collections:
//!
//! - API responses keyed by endpoint + sorted params, indexed by endpoint and timestamp
//! - Image bodies keyed by source URL, indexed by timestamp
//! - Free-form metadata
//!
//! The store knows nothing about TTL policy; callers pass cutoffs in.

pub mod api;
pub mod connection;
pub mod images;
pub mod key;
pub mod metadata;
pub mod migrations;

pub use crate::Error;

pub use api::{ApiCounts, ApiEntry};
pub use connection::{CacheDb, StoreLocation};
pub use images::{ImageBlob, ImageEntry};
pub use key::{Params, generate_key};
