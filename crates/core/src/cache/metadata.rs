//! Key-value metadata stored next to the cache collections.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

/// Metadata key holding the epoch-ms time of the last expiry sweep.
pub const LAST_SWEEP_AT: &str = "last_sweep_at";

impl CacheDb {
    /// Get a metadata value.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result =
                    conn.query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0));

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or update a metadata value.
    pub async fn put_meta(&self, key: &str, value: &str, updated_at: i64) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a metadata value.
    pub async fn delete_meta(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM metadata WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}
