//! Bounded holding buffers for material that arrived too early.
//!
//! Events ahead of the log head wait in an [`OutOfOrderEscrow`] keyed by
//! sequence number; receipts for events we have not seen wait in a
//! [`ReceiptEscrow`] keyed by digest. Both are strictly bounded so a
//! flood of future-dated material cannot grow memory without limit.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::event::EventMessage;
use crate::receipt::Receipt;
use crate::types::Said;

/// What happened to an event offered to the escrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscrowOutcome {
    /// Buffered; it will be retried when the gap closes.
    Buffered,
    /// A message for this sequence number is already held. The first
    /// arrival keeps its slot.
    AlreadyBuffered,
    /// The buffer is at capacity and the message was dropped.
    Full,
}

/// Holds events whose sequence number is ahead of the accepted head.
///
/// Buffered events are unvalidated: everything is re-checked when the
/// gap closes and the event is finally applied.
#[derive(Debug)]
pub struct OutOfOrderEscrow {
    limit: usize,
    pending: BTreeMap<u64, EventMessage>,
}

impl OutOfOrderEscrow {
    pub fn new(limit: usize) -> Self {
        OutOfOrderEscrow {
            limit,
            pending: BTreeMap::new(),
        }
    }

    /// Offer a message, keyed by its own sequence number.
    pub fn insert(&mut self, message: EventMessage) -> EscrowOutcome {
        let seq = message.event.seq;
        if self.pending.contains_key(&seq) {
            return EscrowOutcome::AlreadyBuffered;
        }
        if self.pending.len() >= self.limit {
            return EscrowOutcome::Full;
        }
        self.pending.insert(seq, message);
        EscrowOutcome::Buffered
    }

    /// Remove and return the message buffered for `seq`, if any.
    pub fn take(&mut self, seq: u64) -> Option<EventMessage> {
        self.pending.remove(&seq)
    }

    /// Sequence numbers currently buffered, ascending.
    pub fn pending_seqs(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything. Used when a log is marked compromised.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Holds receipts that reference an event digest we have not accepted.
///
/// Capacity counts distinct digests; when a new digest would exceed it,
/// the oldest digest and all its receipts are evicted.
#[derive(Debug)]
pub struct ReceiptEscrow {
    limit: usize,
    order: VecDeque<Said>,
    pending: HashMap<Said, Vec<Receipt>>,
}

impl ReceiptEscrow {
    pub fn new(limit: usize) -> Self {
        ReceiptEscrow {
            limit,
            order: VecDeque::new(),
            pending: HashMap::new(),
        }
    }

    /// Buffer a receipt under its event digest.
    ///
    /// A later receipt from the same witness for the same digest
    /// replaces the earlier one.
    pub fn insert(&mut self, receipt: Receipt) {
        if let Some(bucket) = self.pending.get_mut(&receipt.said) {
            match bucket.iter_mut().find(|r| r.witness == receipt.witness) {
                Some(existing) => *existing = receipt,
                None => bucket.push(receipt),
            }
            return;
        }
        if self.order.len() >= self.limit {
            if let Some(evicted) = self.order.pop_front() {
                self.pending.remove(&evicted);
            }
        }
        self.order.push_back(receipt.said);
        self.pending.insert(receipt.said, vec![receipt]);
    }

    /// Remove and return every receipt buffered for `said`.
    pub fn take(&mut self, said: &Said) -> Vec<Receipt> {
        match self.pending.remove(said) {
            Some(bucket) => {
                self.order.retain(|s| s != said);
                bucket
            }
            None => Vec::new(),
        }
    }

    /// Distinct event digests currently held.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::event::InteractionBuilder;
    use crate::types::Aid;

    fn message_at(seq: u64, tag: u8) -> EventMessage {
        let kp = Keypair::from_seed(&[tag; 32]);
        InteractionBuilder::new(Aid::from_bytes([tag; 32]), seq, Said::digest(&[tag]))
            .sign(&[&kp])
    }

    fn receipt_for(said_tag: u8, witness_tag: u8) -> Receipt {
        let witness = Keypair::from_seed(&[witness_tag; 32]);
        Receipt::sign(
            Aid::from_bytes([0x01; 32]),
            3,
            Said::digest(&[said_tag]),
            &witness,
        )
    }

    #[test]
    fn test_escrow_buffers_and_releases() {
        let mut escrow = OutOfOrderEscrow::new(4);
        assert_eq!(escrow.insert(message_at(5, 1)), EscrowOutcome::Buffered);
        assert_eq!(escrow.insert(message_at(7, 2)), EscrowOutcome::Buffered);
        assert_eq!(escrow.len(), 2);
        assert_eq!(escrow.pending_seqs().collect::<Vec<_>>(), vec![5, 7]);

        let released = escrow.take(5).unwrap();
        assert_eq!(released.event.seq, 5);
        assert!(escrow.take(5).is_none());
        assert_eq!(escrow.len(), 1);
    }

    #[test]
    fn test_escrow_first_arrival_keeps_slot() {
        let mut escrow = OutOfOrderEscrow::new(4);
        let first = message_at(5, 1);
        let first_said = first.said();
        assert_eq!(escrow.insert(first), EscrowOutcome::Buffered);
        assert_eq!(escrow.insert(message_at(5, 9)), EscrowOutcome::AlreadyBuffered);
        assert_eq!(escrow.take(5).unwrap().said(), first_said);
    }

    #[test]
    fn test_escrow_rejects_when_full() {
        let mut escrow = OutOfOrderEscrow::new(2);
        assert_eq!(escrow.insert(message_at(5, 1)), EscrowOutcome::Buffered);
        assert_eq!(escrow.insert(message_at(6, 2)), EscrowOutcome::Buffered);
        assert_eq!(escrow.insert(message_at(7, 3)), EscrowOutcome::Full);
        // A held slot is still addressable when full.
        assert_eq!(escrow.insert(message_at(6, 4)), EscrowOutcome::AlreadyBuffered);
    }

    #[test]
    fn test_escrow_clear() {
        let mut escrow = OutOfOrderEscrow::new(4);
        escrow.insert(message_at(5, 1));
        escrow.insert(message_at(6, 2));
        escrow.clear();
        assert!(escrow.is_empty());
    }

    #[test]
    fn test_receipt_escrow_buckets_by_digest() {
        let mut escrow = ReceiptEscrow::new(8);
        escrow.insert(receipt_for(1, 0x10));
        escrow.insert(receipt_for(1, 0x11));
        escrow.insert(receipt_for(2, 0x10));
        assert_eq!(escrow.len(), 2);

        let bucket = escrow.take(&Said::digest(&[1]));
        assert_eq!(bucket.len(), 2);
        assert!(escrow.take(&Said::digest(&[1])).is_empty());
        assert_eq!(escrow.len(), 1);
    }

    #[test]
    fn test_receipt_escrow_replaces_same_witness() {
        let mut escrow = ReceiptEscrow::new(8);
        escrow.insert(receipt_for(1, 0x10));
        escrow.insert(receipt_for(1, 0x10));
        assert_eq!(escrow.take(&Said::digest(&[1])).len(), 1);
    }

    #[test]
    fn test_receipt_escrow_evicts_oldest_digest() {
        let mut escrow = ReceiptEscrow::new(2);
        escrow.insert(receipt_for(1, 0x10));
        escrow.insert(receipt_for(2, 0x10));
        escrow.insert(receipt_for(3, 0x10));
        assert_eq!(escrow.len(), 2);
        assert!(escrow.take(&Said::digest(&[1])).is_empty());
        assert_eq!(escrow.take(&Said::digest(&[3])).len(), 1);
    }

    #[test]
    fn test_receipt_escrow_touch_does_not_refresh_age() {
        let mut escrow = ReceiptEscrow::new(2);
        escrow.insert(receipt_for(1, 0x10));
        escrow.insert(receipt_for(2, 0x10));
        // Another receipt for the oldest digest does not move it back in line.
        escrow.insert(receipt_for(1, 0x11));
        escrow.insert(receipt_for(3, 0x10));
        assert!(escrow.take(&Said::digest(&[1])).is_empty());
        assert_eq!(escrow.take(&Said::digest(&[2])).len(), 1);
    }
}
