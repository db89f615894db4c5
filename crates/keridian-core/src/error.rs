//! Error types for the Keridian core.

use thiserror::Error;

use crate::event::EventKind;
use crate::types::{Aid, Said};

/// Errors from cryptographic primitives and the codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A signature failed cryptographic verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// A public key could not be parsed.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// An event could not be decoded.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A receipt could not be decoded.
    #[error("malformed receipt: {0}")]
    MalformedReceipt(String),

    /// The format version is not supported.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// The event kind tag is not recognized.
    #[error("unknown event kind: {0:#04x}")]
    UnknownEventKind(u8),
}

/// Errors from validating events against a key event log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A controller or witness signature failed verification. Fatal for
    /// the submission; never retried. Covers out-of-range key indices.
    #[error("signature verification failed")]
    SignatureFailed,

    /// The attached signatures do not satisfy the signing threshold.
    /// Recoverable: the submitter may retry with more signatures.
    #[error("signatures do not satisfy the signing threshold")]
    InsufficientSignatures,

    /// The format version is not supported.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// The event's sequence number does not continue the log.
    #[error("sequence mismatch: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    /// The event's prior digest does not match the log head.
    #[error("prior digest mismatch: expected {expected}, got {got}")]
    PriorDigestMismatch { expected: Said, got: Said },

    /// The inception event's identifier is not the digest of its own
    /// canonical bytes.
    #[error("identifier does not match inception digest: expected {expected}, got {got}")]
    AidDerivationMismatch { expected: Aid, got: Aid },

    /// The rotation's revealed keys do not digest to the prior
    /// next-key commitment.
    #[error("revealed keys do not match the pre-rotation commitment")]
    CommitmentMismatch,

    /// The prior establishment event carried no next-key commitment,
    /// so the identifier can never rotate again.
    #[error("identifier was abandoned: no next-key commitment to rotate against")]
    RotationAfterAbandonment,

    /// The signing threshold is malformed or does not fit the key list.
    #[error("invalid signing threshold: {0}")]
    InvalidThreshold(String),

    /// The witness list contains a duplicate key.
    #[error("duplicate key in witness list")]
    DuplicateWitnessListed,

    /// The witness threshold is outside `[1, witness count]`
    /// (or nonzero with no witnesses).
    #[error("witness threshold {toad} out of bounds for {count} witnesses")]
    WitnessThresholdOutOfBounds { toad: u32, count: usize },

    /// A rotation cut names a witness not in the prior set.
    #[error("witness cut not present in prior witness set")]
    UnknownWitnessCut,

    /// A rotation add names a witness already in the set, or also cut.
    #[error("witness add already present in witness set")]
    WitnessAlreadyListed,

    /// A receipt came from a key outside the event's witness set.
    #[error("receipt from a key outside the event's witness set")]
    UnknownWitness,

    /// The identifier is configured establishment-only and refuses
    /// interaction events.
    #[error("interaction events are forbidden by this identifier's configuration")]
    EstablishmentOnlyViolation,

    /// A delegated event kind on a non-delegated log, or vice versa.
    #[error("event kind does not match the log's delegation status")]
    DelegationMismatch,

    /// The delegator's log does not anchor this delegated event.
    #[error("delegation seal not anchored in the delegator's log")]
    DelegationNotAnchored,

    /// The named delegator is configured to refuse delegation.
    #[error("delegator refuses delegation")]
    DelegationForbidden,

    /// The delegator's log is compromised, so its anchors approve
    /// nothing.
    #[error("delegator's log is compromised")]
    DelegatorCompromised,

    /// The event kind cannot appear at this position in the log.
    #[error("unexpected event kind: {0:?}")]
    UnexpectedKind(EventKind),

    /// The log is compromised; nothing further is accepted.
    #[error("log is compromised; no further events accepted")]
    Compromised,

    /// A structural error from the codec layer.
    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSignature => ValidationError::SignatureFailed,
            CoreError::InvalidPublicKey => ValidationError::SignatureFailed,
            CoreError::UnsupportedVersion(v) => ValidationError::UnsupportedVersion(v),
            other => ValidationError::StructuralError(other.to_string()),
        }
    }
}
