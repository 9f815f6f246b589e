//! Schema migrations for the cache store.
//!
//! A `_migrations` table records the highest applied version. Each migration
//! only creates what is missing, so bumping the schema never drops cached rows.

use std::num::ParseIntError;

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, SQL), applied in order.
const MIGRATIONS: &[(&str, &str)] = &[
    ("1", include_str!("../../migrations/001_api_cache.sql")),
    ("2", include_str!("../../migrations/002_image_cache.sql")),
    ("3", include_str!("../../migrations/003_metadata.sql")),
];

/// Current schema version, the last entry in the migration list.
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Run any pending migrations.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
            .map_err(Error::from)?;

        for (version, sql) in MIGRATIONS {
            let version_num: i64 =
                version.parse().map_err(|e: ParseIntError| Error::MigrationFailed(e.to_string()))?;
            if version_num > current {
                let tx = conn.transaction()?;
                tx.execute_batch(sql)
                    .map_err(|e| Error::MigrationFailed(format!("version {version_num}: {e}")))?;
                tx.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version_num, chrono::Utc::now().to_rfc3339()],
                )?;
                tx.commit()?;
                tracing::debug!(version = version_num, "applied cache schema migration");
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Highest applied schema version, 0 for a fresh database.
pub async fn current_version(conn: &Connection) -> Result<i64, Error> {
    conn.call(|conn| -> Result<i64, Error> {
        let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
        Ok(version)
    })
    .await
    .map_err(Error::from)
}
