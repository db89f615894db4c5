//! Store trait: the abstract interface for key event log persistence.
//!
//! This trait allows the kernel to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use bytes::Bytes;
use keridian_core::{Aid, EventKind, Receipt, Said};

use crate::error::Result;

/// One accepted event as persisted.
///
/// `canonical` holds the full wire message, event and signature section
/// both, so a restart can replay and re-verify the log from storage
/// alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Controlling identifier.
    pub aid: Aid,
    /// Position in the log.
    pub seq: u64,
    /// Digest of the canonical event.
    pub said: Said,
    /// Event kind, denormalized for queries.
    pub kind: EventKind,
    /// Canonical wire bytes of the full message.
    pub canonical: Bytes,
    /// Local acceptance time (Unix ms).
    pub accepted_at: i64,
}

/// Evidence that two versions of an event exist at one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicityRecord {
    /// The identifier whose log diverged.
    pub aid: Aid,
    /// The sequence number where divergence occurred.
    pub seq: u64,
    /// Digest of the event this log accepted.
    pub accepted: Said,
    /// Digest of the conflicting event that was observed.
    pub observed: Said,
    /// When the divergence was detected (Unix ms).
    pub detected_at: i64,
}

/// Result of appending an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Event was inserted successfully.
    Inserted,
    /// Event already exists (idempotent, not an error).
    AlreadyExists,
    /// Conflict: a different event exists at the same log position.
    Conflict {
        /// Digest of the existing event at this position.
        existing: Said,
    },
}

/// The Store trait: async interface for key event log persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Append only**: accepted events are immutable; nothing updates or
///   deletes an event row.
/// - **Idempotent appends**: appending the same event twice returns
///   `AlreadyExists`.
/// - **Conflict detection**: appending a different event at a filled
///   position returns `Conflict` with the existing digest. The caller
///   decides whether that is duplicity.
/// - **No validation**: the store persists what it is given. All
///   acceptance logic lives above it.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an accepted event.
    ///
    /// # Returns
    /// - `Inserted` if the event was new.
    /// - `AlreadyExists` if the exact same event is already stored.
    /// - `Conflict` if a different event fills the same `(aid, seq)` slot.
    async fn append_event(&self, record: &EventRecord) -> Result<InsertOutcome>;

    /// Get the event at a log position.
    async fn event_at(&self, aid: &Aid, seq: u64) -> Result<Option<EventRecord>>;

    /// Get an event by its digest.
    async fn event_by_said(&self, said: &Said) -> Result<Option<EventRecord>>;

    /// Highest accepted sequence number for an identifier, if any.
    async fn head(&self, aid: &Aid) -> Result<Option<u64>>;

    /// Full accepted log for an identifier, ordered by sequence number.
    async fn load_log(&self, aid: &Aid) -> Result<Vec<EventRecord>>;

    /// Check if an event exists by digest.
    async fn has_event(&self, said: &Said) -> Result<bool>;

    /// All identifiers with at least one accepted event, in stable order.
    async fn list_aids(&self) -> Result<Vec<Aid>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Receipt Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a witness receipt.
    ///
    /// One row per `(said, witness)`: a repeat from the same witness
    /// replaces the stored signature. Returns `true` when the receipt
    /// was new.
    async fn add_receipt(&self, receipt: &Receipt, received_at: i64) -> Result<bool>;

    /// All stored receipts for an event digest.
    async fn receipts_for(&self, said: &Said) -> Result<Vec<Receipt>>;

    /// Number of distinct witnesses that have receipted an event.
    async fn receipt_count(&self, said: &Said) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Duplicity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record evidence of duplicity. Idempotent per `(aid, seq, observed)`.
    async fn record_duplicity(&self, record: &DuplicityRecord) -> Result<()>;

    /// All duplicity evidence for an identifier, ordered by sequence.
    async fn duplicity_records(&self, aid: &Aid) -> Result<Vec<DuplicityRecord>>;

    /// Whether any duplicity has been recorded for an identifier.
    async fn has_duplicity(&self, aid: &Aid) -> Result<bool>;
}
