//! Core types for course-cache.
//!
//! This crate provides:
//! - The SQLite cache store and its schema migrations
//! - Cache key derivation and TTL arithmetic
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;

pub use cache::{ApiEntry, CacheDb, ImageBlob, ImageEntry, Params, StoreLocation, generate_key};
pub use clock::{Clock, DEFAULT_MAX_AGE, SystemClock, is_valid};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
