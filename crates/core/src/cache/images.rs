//! Image cache operations.
//!
//! Image bodies are stored opaque, keyed by their source URL.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// An image body with the MIME type the server reported for it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<String>) -> Self {
        Self { bytes: bytes.into(), content_type }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A cached image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub url: String,
    pub blob: ImageBlob,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
}

impl CacheDb {
    /// Insert or replace a cached image.
    pub async fn put_image(&self, entry: &ImageEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO image_cache (url, blob, content_type, timestamp)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(url) DO UPDATE SET
                        blob = excluded.blob,
                        content_type = excluded.content_type,
                        timestamp = excluded.timestamp",
                    params![&entry.url, &entry.blob.bytes, &entry.blob.content_type, entry.timestamp],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a cached image by URL, regardless of age.
    pub async fn get_image(&self, url: &str) -> Result<Option<ImageEntry>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ImageEntry>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url, blob, content_type, timestamp FROM image_cache WHERE url = ?1")?;

                let result = stmt.query_row(params![url], |row| {
                    Ok(ImageEntry {
                        url: row.get(0)?,
                        blob: ImageBlob { bytes: row.get(1)?, content_type: row.get(2)? },
                        timestamp: row.get(3)?,
                    })
                });

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a cached image by URL.
    ///
    /// Returns whether a row was removed.
    pub async fn delete_image(&self, url: &str) -> Result<bool, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM image_cache WHERE url = ?1", params![url])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of cached images.
    pub async fn count_images(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM image_cache", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
