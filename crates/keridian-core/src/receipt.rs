//! Witness receipts: a witness's signature over an accepted event's
//! digest, separate from the controller's own signatures.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::types::{Aid, Said};

/// Current receipt format version.
pub const RECEIPT_VERSION: u8 = 0;

/// A witness receipt for one event.
///
/// An event accumulates at most one counted receipt per witness key; a
/// later receipt from the same witness replaces the earlier one and
/// never double-counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Format version.
    pub version: u8,
    /// Identifier whose log holds the receipted event.
    pub aid: Aid,
    /// Sequence of the receipted event.
    pub seq: u64,
    /// Digest of the receipted event.
    pub said: Said,
    /// The witness key that signed.
    pub witness: Ed25519PublicKey,
    /// Signature over the event's digest bytes.
    pub signature: Ed25519Signature,
}

impl Receipt {
    /// Create and sign a receipt for the event with the given digest.
    pub fn sign(aid: Aid, seq: u64, said: Said, keypair: &Keypair) -> Self {
        Self {
            version: RECEIPT_VERSION,
            aid,
            seq,
            said,
            witness: keypair.public_key(),
            signature: keypair.sign(said.as_bytes()),
        }
    }

    /// Verify the signature against the witness key.
    pub fn verify(&self) -> Result<(), CoreError> {
        self.witness.verify(self.said.as_bytes(), &self.signature)
    }

    /// Canonical wire bytes.
    pub fn encode(&self) -> Bytes {
        Bytes::from(canonical::receipt_bytes(self))
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        canonical::decode_receipt(bytes)
    }
}
