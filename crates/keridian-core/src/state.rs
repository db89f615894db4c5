//! The key event log state machine.
//!
//! [`KeyState`] is a pure projection of the accepted log prefix:
//! [`KeyState::incept`] starts it, [`KeyState::apply`] folds one more
//! event in, and both return a fresh state or an error without touching
//! the input. Replaying a stored log through these two functions always
//! reproduces the same state, which is what makes the log auditable.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::crypto::Ed25519PublicKey;
use crate::error::ValidationError;
use crate::event::{key_commitment, ConfigTrait, EventKind, EventMessage};
use crate::threshold::SigningThreshold;
use crate::types::{Aid, Said};
use crate::verify::{verify_signatures, Verdict};

/// Trust status of a log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    /// The log has a valid inception and accepts further events.
    Established,
    /// Duplicity was detected. Terminal: nothing further is accepted
    /// without out-of-band resolution.
    Compromised,
}

/// Derived key state for one identifier.
///
/// Never stored as independent truth; the log is the source and this is
/// the fold over it. An empty log has no `KeyState` at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    /// The identifier.
    pub aid: Aid,
    /// Sequence of the last accepted event.
    pub seq: u64,
    /// Digest of the last accepted event.
    pub said: Said,
    /// Current signing keys.
    pub keys: Vec<Ed25519PublicKey>,
    /// Current signing threshold.
    pub threshold: SigningThreshold,
    /// Commitment to the next key list; zero once abandoned.
    pub next_digest: Said,
    /// Current witness set.
    pub witnesses: Vec<Ed25519PublicKey>,
    /// Receipts required for full witnessing.
    pub witness_threshold: u32,
    /// Configuration traits fixed at inception.
    pub config: Vec<ConfigTrait>,
    /// Delegating identifier, if this log is delegated.
    pub delegator: Option<Aid>,
    /// Sequence of the last establishment event.
    pub last_establishment_seq: u64,
    /// Trust status.
    pub status: LogStatus,
}

impl KeyState {
    /// Accept an inception message into an empty log.
    ///
    /// The identifier must be the digest of the event's own canonical
    /// bytes, and the signatures must satisfy the event's declared
    /// threshold with its declared keys.
    pub fn incept(message: &EventMessage) -> Result<KeyState, ValidationError> {
        let event = &message.event;
        if !event.kind.is_inception() {
            return Err(ValidationError::UnexpectedKind(event.kind));
        }
        if event.seq != 0 {
            return Err(ValidationError::InvalidSequence {
                expected: 0,
                got: event.seq,
            });
        }
        if !event.prior.is_zero() {
            return Err(ValidationError::PriorDigestMismatch {
                expected: Said::ZERO,
                got: event.prior,
            });
        }
        match (event.kind, event.delegator.is_some()) {
            (EventKind::DelegatedInception, false) => {
                return Err(ValidationError::StructuralError(
                    "delegated inception missing delegator".to_string(),
                ))
            }
            (EventKind::Inception, true) => {
                return Err(ValidationError::StructuralError(
                    "delegator on a non-delegated inception".to_string(),
                ))
            }
            _ => {}
        }

        let derived = event.derived_aid();
        if event.aid != derived {
            return Err(ValidationError::AidDerivationMismatch {
                expected: derived,
                got: event.aid,
            });
        }

        let threshold = event.threshold.as_ref().ok_or_else(|| {
            ValidationError::StructuralError("inception missing threshold".to_string())
        })?;
        threshold.validate(event.keys.len())?;
        validate_witness_set(&event.witnesses, event.witness_threshold)?;

        let said = event.said();
        check_verdict(verify_signatures(
            &said,
            &message.signatures,
            &event.keys,
            threshold,
        ))?;

        Ok(KeyState {
            aid: event.aid,
            seq: 0,
            said,
            keys: event.keys.clone(),
            threshold: threshold.clone(),
            next_digest: event.next_digest,
            witnesses: event.witnesses.clone(),
            witness_threshold: event.witness_threshold,
            config: event.config.clone(),
            delegator: event.delegator,
            last_establishment_seq: 0,
            status: LogStatus::Established,
        })
    }

    /// Accept the next event, yielding the new state.
    ///
    /// Rejection never mutates anything: either the whole event applies
    /// or none of it does.
    pub fn apply(&self, message: &EventMessage) -> Result<KeyState, ValidationError> {
        if self.status == LogStatus::Compromised {
            return Err(ValidationError::Compromised);
        }
        let event = &message.event;
        if event.aid != self.aid {
            return Err(ValidationError::StructuralError(
                "event belongs to a different identifier".to_string(),
            ));
        }
        let expected = self.seq + 1;
        if event.seq != expected {
            return Err(ValidationError::InvalidSequence {
                expected,
                got: event.seq,
            });
        }
        if event.prior != self.said {
            return Err(ValidationError::PriorDigestMismatch {
                expected: self.said,
                got: event.prior,
            });
        }

        match event.kind {
            EventKind::Rotation | EventKind::DelegatedRotation => self.apply_rotation(message),
            EventKind::Interaction => self.apply_interaction(message),
            kind => Err(ValidationError::UnexpectedKind(kind)),
        }
    }

    fn apply_rotation(&self, message: &EventMessage) -> Result<KeyState, ValidationError> {
        let event = &message.event;

        // A delegated log rotates only with delegated rotations, and a
        // plain log never accepts one.
        if event.kind.is_delegated() != self.delegator.is_some() {
            return Err(ValidationError::DelegationMismatch);
        }
        if self.next_digest.is_zero() {
            return Err(ValidationError::RotationAfterAbandonment);
        }
        if key_commitment(&event.keys) != self.next_digest {
            return Err(ValidationError::CommitmentMismatch);
        }

        let new_threshold = event.threshold.as_ref().ok_or_else(|| {
            ValidationError::StructuralError("rotation missing threshold".to_string())
        })?;
        new_threshold.validate(event.keys.len())?;

        let witnesses =
            rotate_witness_set(&self.witnesses, &event.witness_cuts, &event.witness_adds)?;
        validate_witness_set(&witnesses, event.witness_threshold)?;

        // Authority to rotate rests with the current keys: the event is
        // signed under the threshold being rotated away from.
        let said = event.said();
        check_verdict(verify_signatures(
            &said,
            &message.signatures,
            &self.keys,
            &self.threshold,
        ))?;

        Ok(KeyState {
            aid: self.aid,
            seq: event.seq,
            said,
            keys: event.keys.clone(),
            threshold: new_threshold.clone(),
            next_digest: event.next_digest,
            witnesses,
            witness_threshold: event.witness_threshold,
            config: self.config.clone(),
            delegator: self.delegator,
            last_establishment_seq: event.seq,
            status: LogStatus::Established,
        })
    }

    fn apply_interaction(&self, message: &EventMessage) -> Result<KeyState, ValidationError> {
        if self.config.contains(&ConfigTrait::EstablishmentOnly) {
            return Err(ValidationError::EstablishmentOnlyViolation);
        }

        let event = &message.event;
        let said = event.said();
        check_verdict(verify_signatures(
            &said,
            &message.signatures,
            &self.keys,
            &self.threshold,
        ))?;

        Ok(KeyState {
            seq: event.seq,
            said,
            ..self.clone()
        })
    }

    /// The same state with its status flipped to compromised.
    pub fn as_compromised(&self) -> KeyState {
        KeyState {
            status: LogStatus::Compromised,
            ..self.clone()
        }
    }
}

fn check_verdict(verdict: Verdict) -> Result<(), ValidationError> {
    match verdict {
        Verdict::Satisfied => Ok(()),
        Verdict::Insufficient => Err(ValidationError::InsufficientSignatures),
        Verdict::Invalid => Err(ValidationError::SignatureFailed),
    }
}

/// Witness list invariants: distinct keys; threshold 0 iff no witnesses,
/// otherwise within `[1, count]`.
fn validate_witness_set(
    witnesses: &[Ed25519PublicKey],
    threshold: u32,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(witnesses.len());
    for witness in witnesses {
        if !seen.insert(witness) {
            return Err(ValidationError::DuplicateWitnessListed);
        }
    }
    if witnesses.is_empty() {
        if threshold != 0 {
            return Err(ValidationError::WitnessThresholdOutOfBounds {
                toad: threshold,
                count: 0,
            });
        }
    } else if threshold == 0 || threshold as usize > witnesses.len() {
        return Err(ValidationError::WitnessThresholdOutOfBounds {
            toad: threshold,
            count: witnesses.len(),
        });
    }
    Ok(())
}

/// New witness set after a rotation: `(prior - cuts) + adds`, with the
/// surviving order preserved and adds appended.
fn rotate_witness_set(
    prior: &[Ed25519PublicKey],
    cuts: &[Ed25519PublicKey],
    adds: &[Ed25519PublicKey],
) -> Result<Vec<Ed25519PublicKey>, ValidationError> {
    let mut seen_cuts = HashSet::with_capacity(cuts.len());
    for cut in cuts {
        if !prior.contains(cut) {
            return Err(ValidationError::UnknownWitnessCut);
        }
        if !seen_cuts.insert(cut) {
            return Err(ValidationError::DuplicateWitnessListed);
        }
    }
    let mut seen_adds = HashSet::with_capacity(adds.len());
    for add in adds {
        if prior.contains(add) || cuts.contains(add) {
            return Err(ValidationError::WitnessAlreadyListed);
        }
        if !seen_adds.insert(add) {
            return Err(ValidationError::DuplicateWitnessListed);
        }
    }

    let mut next: Vec<Ed25519PublicKey> = prior
        .iter()
        .filter(|w| !cuts.contains(w))
        .copied()
        .collect();
    next.extend_from_slice(adds);
    Ok(next)
}
