//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the Keridian kernel. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use keridian_core::{Aid, Ed25519PublicKey, Ed25519Signature, EventKind, Receipt, Said};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{DuplicityRecord, EventRecord, InsertOutcome, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Take the connection lock, mapping a poisoned mutex to a database error.
fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

/// Map a failed spawn_blocking join to a database error.
fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(format!("spawn_blocking failed: {}", e)),
    ))
}

// Helper to convert a row to EventRecord
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
    let said_bytes: Vec<u8> = row.get("said")?;
    let aid_bytes: Vec<u8> = row.get("aid")?;
    let seq: i64 = row.get("seq")?;
    let kind_raw: u8 = row.get("kind")?;
    let canonical: Vec<u8> = row.get("canonical")?;
    let accepted_at: i64 = row.get("accepted_at")?;

    let kind = EventKind::from_u8(kind_raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(3, "kind".into(), rusqlite::types::Type::Integer)
    })?;

    Ok(EventRecord {
        aid: Aid::from_bytes(aid_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "aid".into(), rusqlite::types::Type::Blob)
        })?),
        seq: seq as u64,
        said: Said::from_bytes(said_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "said".into(), rusqlite::types::Type::Blob)
        })?),
        kind,
        canonical: Bytes::from(canonical),
        accepted_at,
    })
}

// Helper to convert a row to Receipt
fn row_to_receipt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Receipt> {
    let said_bytes: Vec<u8> = row.get("said")?;
    let witness_bytes: Vec<u8> = row.get("witness")?;
    let aid_bytes: Vec<u8> = row.get("aid")?;
    let seq: i64 = row.get("seq")?;
    let signature_bytes: Vec<u8> = row.get("signature")?;

    Ok(Receipt {
        version: row.get("version")?,
        aid: Aid::from_bytes(aid_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "aid".into(), rusqlite::types::Type::Blob)
        })?),
        seq: seq as u64,
        said: Said::from_bytes(said_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "said".into(), rusqlite::types::Type::Blob)
        })?),
        witness: Ed25519PublicKey(witness_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "witness".into(), rusqlite::types::Type::Blob)
        })?),
        signature: Ed25519Signature(signature_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(5, "signature".into(), rusqlite::types::Type::Blob)
        })?),
    })
}

// Helper to convert a row to DuplicityRecord
fn row_to_duplicity(row: &rusqlite::Row<'_>) -> rusqlite::Result<DuplicityRecord> {
    let aid_bytes: Vec<u8> = row.get("aid")?;
    let seq: i64 = row.get("seq")?;
    let accepted_bytes: Vec<u8> = row.get("accepted")?;
    let observed_bytes: Vec<u8> = row.get("observed")?;
    let detected_at: i64 = row.get("detected_at")?;

    Ok(DuplicityRecord {
        aid: Aid::from_bytes(aid_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "aid".into(), rusqlite::types::Type::Blob)
        })?),
        seq: seq as u64,
        accepted: Said::from_bytes(accepted_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "accepted".into(), rusqlite::types::Type::Blob)
        })?),
        observed: Said::from_bytes(observed_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "observed".into(), rusqlite::types::Type::Blob)
        })?),
        detected_at,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn append_event(&self, record: &EventRecord) -> Result<InsertOutcome> {
        let record = record.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            // Check if the exact event already exists
            let existing_by_said: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT said FROM events WHERE said = ?1",
                    params![record.said.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            if existing_by_said.is_some() {
                return Ok(InsertOutcome::AlreadyExists);
            }

            // Check if a different event fills the same position
            let existing_at_pos: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT said FROM events WHERE aid = ?1 AND seq = ?2",
                    params![record.aid.as_bytes().as_slice(), record.seq as i64],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_bytes) = existing_at_pos {
                let existing = Said::from_bytes(existing_bytes.try_into().unwrap_or([0u8; 32]));
                return Ok(InsertOutcome::Conflict { existing });
            }

            conn.execute(
                "INSERT INTO events (said, aid, seq, kind, canonical, accepted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.said.as_bytes().as_slice(),
                    record.aid.as_bytes().as_slice(),
                    record.seq as i64,
                    record.kind.to_u8() as i64,
                    record.canonical.as_ref(),
                    record.accepted_at,
                ],
            )?;

            Ok(InsertOutcome::Inserted)
        })
        .await
        .map_err(join_error)?
    }

    async fn event_at(&self, aid: &Aid, seq: u64) -> Result<Option<EventRecord>> {
        let aid = *aid;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.query_row(
                "SELECT said, aid, seq, kind, canonical, accepted_at
                 FROM events WHERE aid = ?1 AND seq = ?2",
                params![aid.as_bytes().as_slice(), seq as i64],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
        .map_err(join_error)?
    }

    async fn event_by_said(&self, said: &Said) -> Result<Option<EventRecord>> {
        let said = *said;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.query_row(
                "SELECT said, aid, seq, kind, canonical, accepted_at
                 FROM events WHERE said = ?1",
                params![said.as_bytes().as_slice()],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
        .map_err(join_error)?
    }

    async fn head(&self, aid: &Aid) -> Result<Option<u64>> {
        let aid = *aid;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let head: Option<i64> = conn.query_row(
                "SELECT MAX(seq) FROM events WHERE aid = ?1",
                params![aid.as_bytes().as_slice()],
                |row| row.get(0),
            )?;

            Ok(head.map(|v| v as u64))
        })
        .await
        .map_err(join_error)?
    }

    async fn load_log(&self, aid: &Aid) -> Result<Vec<EventRecord>> {
        let aid = *aid;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let mut stmt = conn.prepare(
                "SELECT said, aid, seq, kind, canonical, accepted_at
                 FROM events WHERE aid = ?1 ORDER BY seq",
            )?;

            let log = stmt
                .query_map(params![aid.as_bytes().as_slice()], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(log)
        })
        .await
        .map_err(join_error)?
    }

    async fn has_event(&self, said: &Said) -> Result<bool> {
        let said = *said;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM events WHERE said = ?1)",
                params![said.as_bytes().as_slice()],
                |row| row.get(0),
            )?;

            Ok(exists)
        })
        .await
        .map_err(join_error)?
    }

    async fn list_aids(&self) -> Result<Vec<Aid>> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let mut stmt = conn.prepare("SELECT DISTINCT aid FROM events ORDER BY aid")?;

            let aids = stmt
                .query_map([], |row| {
                    let bytes: Vec<u8> = row.get(0)?;
                    Ok(Aid::from_bytes(bytes.try_into().unwrap_or([0u8; 32])))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(aids)
        })
        .await
        .map_err(join_error)?
    }

    async fn add_receipt(&self, receipt: &Receipt, received_at: i64) -> Result<bool> {
        let receipt = receipt.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let existed: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM receipts WHERE said = ?1 AND witness = ?2)",
                params![
                    receipt.said.as_bytes().as_slice(),
                    receipt.witness.0.as_slice(),
                ],
                |row| row.get(0),
            )?;

            conn.execute(
                "INSERT INTO receipts (said, witness, version, aid, seq, signature, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(said, witness) DO UPDATE SET
                    signature = excluded.signature,
                    received_at = excluded.received_at",
                params![
                    receipt.said.as_bytes().as_slice(),
                    receipt.witness.0.as_slice(),
                    receipt.version as i64,
                    receipt.aid.as_bytes().as_slice(),
                    receipt.seq as i64,
                    receipt.signature.0.as_slice(),
                    received_at,
                ],
            )?;

            Ok(!existed)
        })
        .await
        .map_err(join_error)?
    }

    async fn receipts_for(&self, said: &Said) -> Result<Vec<Receipt>> {
        let said = *said;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let mut stmt = conn.prepare(
                "SELECT said, witness, version, aid, seq, signature
                 FROM receipts WHERE said = ?1 ORDER BY received_at, witness",
            )?;

            let receipts = stmt
                .query_map(params![said.as_bytes().as_slice()], row_to_receipt)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(receipts)
        })
        .await
        .map_err(join_error)?
    }

    async fn receipt_count(&self, said: &Said) -> Result<u64> {
        let said = *said;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM receipts WHERE said = ?1",
                params![said.as_bytes().as_slice()],
                |row| row.get(0),
            )?;

            Ok(count as u64)
        })
        .await
        .map_err(join_error)?
    }

    async fn record_duplicity(&self, record: &DuplicityRecord) -> Result<()> {
        let record = record.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.execute(
                "INSERT OR IGNORE INTO duplicity (aid, seq, accepted, observed, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.aid.as_bytes().as_slice(),
                    record.seq as i64,
                    record.accepted.as_bytes().as_slice(),
                    record.observed.as_bytes().as_slice(),
                    record.detected_at,
                ],
            )?;

            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn duplicity_records(&self, aid: &Aid) -> Result<Vec<DuplicityRecord>> {
        let aid = *aid;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let mut stmt = conn.prepare(
                "SELECT aid, seq, accepted, observed, detected_at
                 FROM duplicity WHERE aid = ?1 ORDER BY seq, detected_at",
            )?;

            let records = stmt
                .query_map(params![aid.as_bytes().as_slice()], row_to_duplicity)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
        .await
        .map_err(join_error)?
    }

    async fn has_duplicity(&self, aid: &Aid) -> Result<bool> {
        let aid = *aid;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM duplicity WHERE aid = ?1)",
                params![aid.as_bytes().as_slice()],
                |row| row.get(0),
            )?;

            Ok(exists)
        })
        .await
        .map_err(join_error)?
    }
}
