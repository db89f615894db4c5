//! # Keridian Core
//!
//! Pure primitives for the Keridian kernel: key events, receipts, thresholds,
//! and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`KeyEvent`] - One entry in a key event log
//! - [`EventMessage`] - An event together with its controller signatures
//! - [`Receipt`] - A witness attestation over an accepted event
//! - [`Aid`] / [`Said`] - Content-addressed identifiers (Blake3 digests)
//! - [`KeyState`] - The fold of an accepted log prefix
//!
//! ## Canonicalization
//!
//! All events and receipts are encoded using deterministic CBOR. See the
//! [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod duplicity;
pub mod error;
pub mod escrow;
pub mod event;
pub mod receipt;
pub mod state;
pub mod threshold;
pub mod types;
pub mod verify;
pub mod witness;

pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use duplicity::{DuplicityCheck, DuplicityDetector};
pub use error::{CoreError, ValidationError};
pub use escrow::{EscrowOutcome, OutOfOrderEscrow, ReceiptEscrow};
pub use event::{
    key_commitment, ConfigTrait, EventKind, EventMessage, InceptionBuilder, IndexedSignature,
    InteractionBuilder, KeyEvent, RotationBuilder, Seal, EVENT_VERSION,
};
pub use receipt::{Receipt, RECEIPT_VERSION};
pub use state::{KeyState, LogStatus};
pub use threshold::{SigningThreshold, Weight};
pub use types::{Aid, Said};
pub use verify::{verify_signatures, Verdict};
pub use witness::{ReceiptOutcome, ReceiptTracker};
