//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;

            tracing::info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Accepted key events, append only
        CREATE TABLE events (
            said BLOB PRIMARY KEY,            -- 32 bytes, Blake3 digest of canonical event
            aid BLOB NOT NULL,                -- 32 bytes, controlling identifier
            seq INTEGER NOT NULL,             -- position in the log
            kind INTEGER NOT NULL,            -- EventKind as u8
            canonical BLOB NOT NULL,          -- full wire message (event + signatures)
            accepted_at INTEGER NOT NULL,     -- local acceptance time (Unix ms)

            UNIQUE(aid, seq)
        );

        -- Witness receipts, one row per (event, witness)
        CREATE TABLE receipts (
            said BLOB NOT NULL,               -- 32 bytes, receipted event digest
            witness BLOB NOT NULL,            -- 32 bytes, Ed25519 public key
            version INTEGER NOT NULL,         -- receipt format version
            aid BLOB NOT NULL,                -- 32 bytes
            seq INTEGER NOT NULL,
            signature BLOB NOT NULL,          -- 64 bytes, Ed25519 signature over said
            received_at INTEGER NOT NULL,     -- local receipt time (Unix ms)

            PRIMARY KEY (said, witness)
        );

        -- Duplicity evidence
        CREATE TABLE duplicity (
            aid BLOB NOT NULL,
            seq INTEGER NOT NULL,
            accepted BLOB NOT NULL,           -- 32 bytes, digest this log accepted
            observed BLOB NOT NULL,           -- 32 bytes, conflicting digest
            detected_at INTEGER NOT NULL,

            PRIMARY KEY (aid, seq, observed)
        );

        -- Indexes for common queries
        CREATE INDEX idx_events_aid_seq ON events(aid, seq);
        CREATE INDEX idx_receipts_aid_seq ON receipts(aid, seq);
        CREATE INDEX idx_duplicity_aid ON duplicity(aid);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"events".to_string()));
        assert!(tables.contains(&"receipts".to_string()));
        assert!(tables.contains(&"duplicity".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap(); // Should not error
        migrate(&mut conn).unwrap(); // Still should not error

        // Verify version is 1
        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }
}
