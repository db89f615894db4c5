//! # Keridian
//!
//! The unified API for the Keridian system - self-certifying identifiers
//! backed by key event logs, pre-rotation, and witness receipts.
//!
//! ## Overview
//!
//! The Keridian kernel provides a portable, offline-first library for:
//!
//! - **Key events**: Signed, self-addressing records that establish and
//!   evolve an identifier's key state
//! - **Logs**: Hash-chained, append-only event sequences per identifier
//! - **Witnesses**: Receipt accumulation toward a declared threshold
//! - **Duplicity**: Detection and permanent evidence of conflicting
//!   event versions
//!
//! ## Key Concepts
//!
//! - **AID**: An identifier derived from its own inception event.
//! - **Pre-rotation**: Each establishment event commits to the next keys
//!   before they are ever used to sign.
//! - **Receipt**: A witness's signature over an accepted event's digest.
//! - **Duplicity**: Two verifiable versions of the same event. Fatal for
//!   the log, permanent in storage.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keridian::{Kernel, KernelConfig};
//! use keridian::core::{InceptionBuilder, Keypair, SigningThreshold};
//! use keridian::store::SqliteStore;
//!
//! async fn example() {
//!     // Controller keys: one to sign now, one committed for later
//!     let current = Keypair::generate();
//!     let next = Keypair::generate();
//!
//!     // Open storage
//!     let store = SqliteStore::open("kel.db").unwrap();
//!
//!     // Create the kernel
//!     let kernel = Kernel::new(store, KernelConfig::default());
//!
//!     // Incept an identifier
//!     let message = InceptionBuilder::new(
//!         vec![current.public_key()],
//!         SigningThreshold::simple(1),
//!     )
//!     .next_keys(vec![next.public_key()])
//!     .sign(&[&current]);
//!
//!     let outcome = kernel.submit_message(&message).await.unwrap();
//!     println!("{outcome:?}");
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `keridian::core` - Core primitives (events, receipts, key state)
//! - `keridian::store` - Storage abstraction and SQLite

pub mod error;
pub mod kernel;

// Re-export component crates
pub use keridian_core as core;
pub use keridian_store as store;

// Re-export main types for convenience
pub use error::{KernelError, Result};
pub use kernel::{Kernel, KernelConfig, ReceiptSubmitOutcome, SubmitOutcome, WitnessStatus};

// Re-export commonly used core types
pub use keridian_core::{
    Aid, Ed25519PublicKey, Ed25519Signature, EventKind, EventMessage, InceptionBuilder,
    InteractionBuilder, KeyState, Keypair, LogStatus, Receipt, RotationBuilder, Said, Seal,
    SigningThreshold,
};
