//! # Keridian Store
//!
//! Storage abstraction for the Keridian kernel. Provides a trait-based interface
//! for key event log persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts event log storage behind the [`Store`] trait,
//! allowing the kernel to be storage-agnostic. The primary implementation
//! is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`EventRecord`] - One accepted event as persisted
//! - [`InsertOutcome`] - Result of appending an event
//! - [`DuplicityRecord`] - Evidence of conflicting event versions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keridian_store::{SqliteStore, Store, InsertOutcome};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("kel.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Append an accepted event
//!     // let record: EventRecord = ...;
//!     // let outcome = store.append_event(&record).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append only**: accepted events are never updated or deleted
//! - **Idempotent appends**: appending the same event twice returns `AlreadyExists`
//! - **Conflict detection**: different event at a filled position returns `Conflict`
//! - **No validation**: acceptance logic lives in the kernel, not here

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{DuplicityRecord, EventRecord, InsertOutcome, Store};
