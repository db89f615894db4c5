//! Receipt accounting for accepted events.
//!
//! Each accepted event is tracked together with the witness set and
//! threshold that were in force when it was accepted. Receipts then
//! accumulate against that snapshot: witness rotation at a later event
//! never changes what an earlier event needs to count as fully
//! witnessed.

use std::collections::HashMap;

use crate::crypto::Ed25519PublicKey;
use crate::error::ValidationError;
use crate::receipt::Receipt;
use crate::types::Said;

/// Result of recording a receipt against a tracked event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// Counted toward the threshold.
    Accepted,
    /// This witness already receipted this event. The stored receipt is
    /// replaced after the new one verifies.
    Duplicate,
    /// The digest does not name any tracked event.
    UnknownEvent,
}

#[derive(Debug)]
struct TrackedEvent {
    witnesses: Vec<Ed25519PublicKey>,
    threshold: u32,
    received: HashMap<Ed25519PublicKey, Receipt>,
}

/// Per-identifier receipt ledger.
#[derive(Debug, Default)]
pub struct ReceiptTracker {
    events: HashMap<Said, TrackedEvent>,
}

impl ReceiptTracker {
    pub fn new() -> Self {
        ReceiptTracker::default()
    }

    /// Register an accepted event with the witness configuration in
    /// force at its acceptance. Re-registering the same digest is a
    /// no-op so already-counted receipts survive a replay.
    pub fn track_event(&mut self, said: Said, witnesses: &[Ed25519PublicKey], threshold: u32) {
        self.events.entry(said).or_insert_with(|| TrackedEvent {
            witnesses: witnesses.to_vec(),
            threshold,
            received: HashMap::new(),
        });
    }

    /// Record one receipt.
    ///
    /// The witness must be listed for the event and the signature must
    /// verify over the event digest; otherwise the receipt is rejected
    /// and nothing is counted.
    pub fn record(&mut self, receipt: &Receipt) -> Result<ReceiptOutcome, ValidationError> {
        let tracked = match self.events.get_mut(&receipt.said) {
            Some(tracked) => tracked,
            None => return Ok(ReceiptOutcome::UnknownEvent),
        };
        if !tracked.witnesses.contains(&receipt.witness) {
            return Err(ValidationError::UnknownWitness);
        }
        receipt.verify()?;

        match tracked.received.insert(receipt.witness, receipt.clone()) {
            Some(_) => Ok(ReceiptOutcome::Duplicate),
            None => Ok(ReceiptOutcome::Accepted),
        }
    }

    /// Whether `said` has met its witness threshold.
    ///
    /// An event with no witnesses is trivially fully witnessed. Returns
    /// `None` for untracked digests.
    pub fn fully_witnessed(&self, said: &Said) -> Option<bool> {
        let tracked = self.events.get(said)?;
        Some(tracked.received.len() >= tracked.threshold as usize)
    }

    /// Receipts counted so far for `said`.
    pub fn receipt_count(&self, said: &Said) -> usize {
        self.events
            .get(said)
            .map(|t| t.received.len())
            .unwrap_or(0)
    }

    /// The threshold registered for `said`, if tracked.
    pub fn threshold_for(&self, said: &Said) -> Option<u32> {
        self.events.get(said).map(|t| t.threshold)
    }

    pub fn is_tracked(&self, said: &Said) -> bool {
        self.events.contains_key(said)
    }
}
