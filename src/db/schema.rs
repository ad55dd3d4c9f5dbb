//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- One row per time bucket of a series
        CREATE TABLE IF NOT EXISTS series_buckets (
            key TEXT PRIMARY KEY,
            prefix TEXT NOT NULL,
            start INTEGER NOT NULL,
            expires_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_series_buckets_prefix ON series_buckets(prefix, start);
        CREATE INDEX IF NOT EXISTS idx_series_buckets_expiry ON series_buckets(expires_at)
            WHERE expires_at IS NOT NULL;

        -- Ordered set of serialized values per bucket, scored by timestamp
        CREATE TABLE IF NOT EXISTS series_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bucket_key TEXT NOT NULL REFERENCES series_buckets(key),
            score INTEGER NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(bucket_key, value)
        );

        CREATE INDEX IF NOT EXISTS idx_series_entries_score ON series_entries(bucket_key, score);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1 (time series)");
    Ok(())
}
