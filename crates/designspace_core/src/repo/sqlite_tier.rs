//! SQLite-backed storage tiers.
//!
//! # Responsibility
//! - Persist bulk documents in `bulk_documents` and small values in
//!   `kv_entries` of one migrated database.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Construction requires a connection at the latest schema version.
//! - Writes are single-statement upserts; a failed write leaves the prior
//!   row intact.

use crate::db::migrations::latest_version;
use crate::db::{DbError, DbResult};
use crate::repo::tier::{BulkTier, KvTier, TierResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Bulk document tier over `bulk_documents`.
pub struct SqliteBulkTier<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBulkTier<'conn> {
    /// Constructs a tier from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> DbResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl BulkTier for SqliteBulkTier<'_> {
    fn read(&self, key: &str) -> TierResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM bulk_documents WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> TierResult<()> {
        self.conn.execute(
            "INSERT INTO bulk_documents (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        self.conn
            .execute("DELETE FROM bulk_documents WHERE key = ?1;", [key])?;
        Ok(())
    }
}

/// Small-value tier over `kv_entries`.
pub struct SqliteKvTier<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKvTier<'conn> {
    /// Constructs a tier from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> DbResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl KvTier for SqliteKvTier<'_> {
    fn get(&self, key: &str) -> TierResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> TierResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        Ok(())
    }
}

fn ensure_schema_ready(conn: &Connection) -> DbResult<()> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();
    if version < latest {
        return Err(DbError::SchemaNotReady {
            db_version: version,
            expected: latest,
        });
    }
    if version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: version,
            latest_supported: latest,
        });
    }
    Ok(())
}
