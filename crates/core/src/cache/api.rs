//! API response cache operations.
//!
//! Rows are keyed by the derived cache key and carry their endpoint so that
//! bulk invalidation can work without knowing exact parameters.

use super::connection::CacheDb;
use super::key::{Params, generate_key};
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_rusqlite::{params, rusqlite};

/// A cached API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEntry {
    pub key: String,
    pub endpoint: String,
    pub params: Params,
    pub data: Value,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
}

impl ApiEntry {
    /// Build an entry, deriving its key from the endpoint and params.
    pub fn new(endpoint: &str, params: Params, data: Value, timestamp: i64) -> Self {
        Self { key: generate_key(endpoint, &params), endpoint: endpoint.to_string(), params, data, timestamp }
    }
}

/// Row counts over the API namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCounts {
    pub total: u64,
    pub expired: u64,
}

impl CacheDb {
    /// Insert or replace an API entry.
    pub async fn put_api(&self, entry: &ApiEntry) -> Result<(), Error> {
        let params_json = serde_json::to_string(&entry.params)?;
        let data_json = serde_json::to_string(&entry.data)?;
        let key = entry.key.clone();
        let endpoint = entry.endpoint.clone();
        let timestamp = entry.timestamp;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO api_cache (key, endpoint, params_json, data_json, timestamp)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(key) DO UPDATE SET
                        endpoint = excluded.endpoint,
                        params_json = excluded.params_json,
                        data_json = excluded.data_json,
                        timestamp = excluded.timestamp",
                    params![key, endpoint, params_json, data_json, timestamp],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an API entry by key, regardless of age.
    ///
    /// Returns None if the key doesn't exist in the cache.
    pub async fn get_api(&self, key: &str) -> Result<Option<ApiEntry>, Error> {
        let key = key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, String, String, String, i64)>, Error> {
                let mut stmt = conn
                    .prepare("SELECT key, endpoint, params_json, data_json, timestamp FROM api_cache WHERE key = ?1")?;

                let result = stmt.query_row(params![key], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((key, endpoint, params_json, data_json, timestamp)) = row else {
            return Ok(None);
        };

        Ok(Some(ApiEntry {
            key,
            endpoint,
            params: serde_json::from_str(&params_json)?,
            data: serde_json::from_str(&data_json)?,
            timestamp,
        }))
    }

    /// Delete an API entry by exact key.
    ///
    /// Returns whether a row was removed.
    pub async fn delete_api(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM api_cache WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every API entry whose endpoint contains `pattern` as a literal substring.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_api_by_endpoint(&self, pattern: &str) -> Result<u64, Error> {
        let pattern = pattern.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM api_cache WHERE instr(endpoint, ?1) > 0", params![pattern])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete API entries written at or before `cutoff` (epoch ms).
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_api_older_than(&self, cutoff: i64) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM api_cache WHERE timestamp <= ?1", params![cutoff])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count all API entries and those written at or before `cutoff`.
    pub async fn count_api(&self, cutoff: i64) -> Result<ApiCounts, Error> {
        self.conn
            .call(move |conn| -> Result<ApiCounts, Error> {
                let (total, expired): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN timestamp <= ?1 THEN 1 ELSE 0 END), 0) FROM api_cache",
                    params![cutoff],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(ApiCounts { total: total as u64, expired: expired as u64 })
            })
            .await
            .map_err(Error::from)
    }

    /// Empty both the API and image collections in one transaction.
    pub async fn clear_all(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM api_cache", [])?;
                tx.execute("DELETE FROM image_cache", [])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
