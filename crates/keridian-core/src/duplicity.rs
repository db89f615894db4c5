//! Detection of conflicting event versions.
//!
//! Once an event is accepted at a sequence number, that slot is filled
//! forever. A later submission naming the same slot either matches the
//! accepted digest byte for byte (an idempotent resubmission) or it is
//! evidence that the controller published two versions of history. The
//! detector only answers which case holds; deciding whether the
//! conflicting candidate is verifiable enough to condemn the log is the
//! caller's job.

use std::collections::BTreeMap;

use crate::types::Said;

/// Outcome of checking a candidate digest against a filled slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicityCheck {
    /// Same digest as the accepted event.
    Match,
    /// A different digest at an already-filled sequence number.
    Divergent {
        /// Digest of the event this log accepted.
        accepted: Said,
    },
    /// Nothing accepted at this sequence number.
    Unknown,
}

/// Accepted-digest ledger for one identifier.
///
/// Populated only from accepted events; buffered or rejected material
/// never fills a slot.
#[derive(Debug, Default)]
pub struct DuplicityDetector {
    accepted: BTreeMap<u64, Said>,
}

impl DuplicityDetector {
    pub fn new() -> Self {
        DuplicityDetector::default()
    }

    /// Record the digest accepted at `seq`. The first recording wins;
    /// an accepted slot's digest never changes.
    pub fn note_accepted(&mut self, seq: u64, said: Said) {
        self.accepted.entry(seq).or_insert(said);
    }

    /// Compare a candidate digest against the accepted slot.
    pub fn check(&self, seq: u64, said: &Said) -> DuplicityCheck {
        match self.accepted.get(&seq) {
            Some(accepted) if accepted == said => DuplicityCheck::Match,
            Some(accepted) => DuplicityCheck::Divergent {
                accepted: *accepted,
            },
            None => DuplicityCheck::Unknown,
        }
    }

    /// Digest accepted at `seq`, if the slot is filled.
    pub fn accepted_at(&self, seq: u64) -> Option<Said> {
        self.accepted.get(&seq).copied()
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_resubmission() {
        let mut detector = DuplicityDetector::new();
        let said = Said::digest(b"event zero");
        detector.note_accepted(0, said);
        assert_eq!(detector.check(0, &said), DuplicityCheck::Match);
    }

    #[test]
    fn test_divergent_candidate_reports_accepted_digest() {
        let mut detector = DuplicityDetector::new();
        let accepted = Said::digest(b"the real event");
        let forged = Said::digest(b"the other story");
        detector.note_accepted(3, accepted);
        assert_eq!(
            detector.check(3, &forged),
            DuplicityCheck::Divergent { accepted }
        );
    }

    #[test]
    fn test_vacant_slot_is_unknown() {
        let detector = DuplicityDetector::new();
        assert_eq!(
            detector.check(7, &Said::digest(b"anything")),
            DuplicityCheck::Unknown
        );
    }

    #[test]
    fn test_slots_are_independent() {
        let mut detector = DuplicityDetector::new();
        let s0 = Said::digest(b"zero");
        let s1 = Said::digest(b"one");
        detector.note_accepted(0, s0);
        detector.note_accepted(1, s1);
        assert_eq!(detector.check(0, &s0), DuplicityCheck::Match);
        assert_eq!(detector.check(1, &s0), DuplicityCheck::Divergent { accepted: s1 });
        assert_eq!(detector.len(), 2);
    }

    #[test]
    fn test_first_recording_wins() {
        let mut detector = DuplicityDetector::new();
        let first = Said::digest(b"first");
        detector.note_accepted(2, first);
        detector.note_accepted(2, Said::digest(b"second"));
        assert_eq!(detector.accepted_at(2), Some(first));
    }
}
