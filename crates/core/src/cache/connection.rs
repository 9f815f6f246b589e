//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying pragmas for
//! WAL mode, and running migrations.

use super::migrations;
use crate::Error;
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cloning shares the same connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

/// Where the cache database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A SQLite file on disk, created on first open.
    File(PathBuf),
    /// A private in-memory database, gone when the handle is dropped.
    Memory,
}

impl StoreLocation {
    /// Open (or create) the database at this location.
    pub async fn open(&self) -> Result<CacheDb, Error> {
        match self {
            StoreLocation::File(path) => CacheDb::open(path).await,
            StoreLocation::Memory => CacheDb::open_in_memory().await,
        }
    }
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Applied schema version.
    pub async fn schema_version(&self) -> Result<i64, Error> {
        migrations::current_version(&self.conn).await
    }
}
