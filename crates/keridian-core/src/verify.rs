//! Controller signature verification against an authoritative key list.
//!
//! Pure and synchronous; safe to run in parallel across independent
//! messages. Which key list is authoritative depends on the event: an
//! inception verifies against its own declared keys, everything after
//! verifies against the keys of the state being extended.

use crate::crypto::Ed25519PublicKey;
use crate::event::IndexedSignature;
use crate::threshold::SigningThreshold;
use crate::types::Said;

/// Outcome of checking a message's signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Valid signatures meet the threshold.
    Satisfied,
    /// Every signature is valid but the threshold is not met. The
    /// submitter may retry with more signatures attached.
    Insufficient,
    /// A signature failed verification or named a key out of range.
    /// Fatal: no retry can fix the message.
    Invalid,
}

/// Verify indexed signatures over an event digest.
///
/// One bad signature poisons the whole message. Duplicate indices are
/// tolerated but a key counts at most once toward the threshold.
pub fn verify_signatures(
    said: &Said,
    signatures: &[IndexedSignature],
    keys: &[Ed25519PublicKey],
    threshold: &SigningThreshold,
) -> Verdict {
    let mut indices = Vec::with_capacity(signatures.len());
    for sig in signatures {
        let index = sig.index as usize;
        let key = match keys.get(index) {
            Some(key) => key,
            None => return Verdict::Invalid,
        };
        if key.verify(said.as_bytes(), &sig.signature).is_err() {
            return Verdict::Invalid;
        }
        indices.push(index);
    }

    if threshold.satisfied(&indices, keys.len()) {
        Verdict::Satisfied
    } else {
        Verdict::Insufficient
    }
}
