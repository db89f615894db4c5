//! Key event types: the records that make up a key event log (KEL).
//!
//! One flat [`KeyEvent`] struct covers every kind; the codec enforces
//! which fields each kind carries on the wire. Builders at the bottom
//! are what identifier tooling uses to construct signed messages; the
//! kernel itself only validates.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::threshold::SigningThreshold;
use crate::types::{Aid, Said};

/// Current event format version.
pub const EVENT_VERSION: u8 = 0;

/// Maximum number of signing keys per event.
pub const MAX_KEYS: usize = 32;

/// Maximum number of witnesses per identifier.
pub const MAX_WITNESSES: usize = 32;

/// Maximum number of seals per event.
pub const MAX_ANCHORS: usize = 16;

/// Maximum number of attached signatures per message.
pub const MAX_SIGNATURES: usize = 64;

/// The kind of a key event.
///
/// Tags are grouped by range: 0x01-0x0f direct events, 0x11-0x1f their
/// delegated variants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    /// Establishes a new identifier and its initial key state.
    Inception = 0x01,
    /// Replaces the signing keys with the pre-committed next keys.
    Rotation = 0x02,
    /// Anchors data into the log without changing key state.
    Interaction = 0x03,
    /// Inception cooperatively anchored in a delegator's log.
    DelegatedInception = 0x11,
    /// Rotation of a delegated identifier.
    DelegatedRotation = 0x12,
}

impl EventKind {
    /// The wire tag.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag.
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(EventKind::Inception),
            0x02 => Some(EventKind::Rotation),
            0x03 => Some(EventKind::Interaction),
            0x11 => Some(EventKind::DelegatedInception),
            0x12 => Some(EventKind::DelegatedRotation),
            _ => None,
        }
    }

    /// Establishment events create or change key state.
    pub const fn is_establishment(self) -> bool {
        matches!(
            self,
            EventKind::Inception
                | EventKind::Rotation
                | EventKind::DelegatedInception
                | EventKind::DelegatedRotation
        )
    }

    /// Inception kinds start a log at sequence 0.
    pub const fn is_inception(self) -> bool {
        matches!(self, EventKind::Inception | EventKind::DelegatedInception)
    }

    /// Rotation kinds reveal the pre-committed next keys.
    pub const fn is_rotation(self) -> bool {
        matches!(self, EventKind::Rotation | EventKind::DelegatedRotation)
    }

    /// Delegated kinds require an anchor in the delegator's log.
    pub const fn is_delegated(self) -> bool {
        matches!(
            self,
            EventKind::DelegatedInception | EventKind::DelegatedRotation
        )
    }

    /// Every kind except inception chains to a predecessor.
    pub const fn has_prior(self) -> bool {
        !self.is_inception()
    }
}

/// Configuration traits declared at inception, immutable for the life
/// of the log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConfigTrait {
    /// Only establishment events are accepted; interactions are refused.
    EstablishmentOnly = 0x01,
    /// This identifier refuses to act as a delegator.
    DoNotDelegate = 0x02,
}

impl ConfigTrait {
    /// The wire tag.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag.
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(ConfigTrait::EstablishmentOnly),
            0x02 => Some(ConfigTrait::DoNotDelegate),
            _ => None,
        }
    }
}

/// An anchor binding external data or a delegated event into a log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seal {
    /// Owning identifier of the sealed event, or zero for bare data.
    pub aid: Aid,
    /// Sequence of the sealed event, 0 for bare data.
    pub seq: u64,
    /// Digest of the sealed content.
    pub said: Said,
}

impl Seal {
    /// Seal of an event in another identifier's log.
    pub const fn event(aid: Aid, seq: u64, said: Said) -> Self {
        Self { aid, seq, said }
    }

    /// Seal of bare external data with no owning log.
    pub const fn data(said: Said) -> Self {
        Self {
            aid: Aid::ZERO,
            seq: 0,
            said,
        }
    }
}

/// One record in a key event log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Format version.
    pub version: u8,
    /// What this event does to the log.
    pub kind: EventKind,
    /// The identifier this event belongs to.
    pub aid: Aid,
    /// Position in the log; 0 for inception, then +1 per event.
    pub seq: u64,
    /// Digest of the predecessor event. Zero only on inceptions.
    pub prior: Said,
    /// Signing keys declared by this event (establishment kinds only).
    pub keys: Vec<Ed25519PublicKey>,
    /// Signing threshold over `keys` (establishment kinds only).
    pub threshold: Option<SigningThreshold>,
    /// Pre-rotation commitment: digest of the next key list. Zero means
    /// the identifier can never rotate again.
    pub next_digest: Said,
    /// Declared witness set (inception kinds; rotations use cuts/adds).
    pub witnesses: Vec<Ed25519PublicKey>,
    /// Receipts required before the event counts as fully witnessed.
    pub witness_threshold: u32,
    /// Witnesses removed by this rotation.
    pub witness_cuts: Vec<Ed25519PublicKey>,
    /// Witnesses added by this rotation.
    pub witness_adds: Vec<Ed25519PublicKey>,
    /// Configuration traits (inception kinds only).
    pub config: Vec<ConfigTrait>,
    /// Seals anchoring external data into the log.
    pub anchors: Vec<Seal>,
    /// The delegating identifier (delegated inception only).
    pub delegator: Option<Aid>,
}

impl KeyEvent {
    /// The event's self-addressing digest over its canonical bytes.
    pub fn said(&self) -> Said {
        Said::digest(&canonical::event_bytes(self))
    }

    /// The identifier an inception derives: the digest of its canonical
    /// bytes with the identifier field zeroed.
    pub fn derived_aid(&self) -> Aid {
        Aid(Said::digest(&canonical::inception_digest_bytes(self)).0)
    }
}

/// Digest committing to a key list, in declared order.
///
/// Used both to commit to the next keys ahead of time and to check the
/// keys a rotation reveals. Both sides must use this one function or
/// pre-rotation breaks silently.
pub fn key_commitment(keys: &[Ed25519PublicKey]) -> Said {
    Said::digest(&canonical::key_list_bytes(keys))
}

/// A controller signature over an event's digest, tagged with the index
/// of its key in the authoritative key list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    /// Index into the key list the signature counts against.
    pub index: u32,
    /// Signature over the event's [`Said`] bytes.
    pub signature: Ed25519Signature,
}

/// A key event together with its attached controller signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: KeyEvent,
    pub signatures: Vec<IndexedSignature>,
}

impl EventMessage {
    /// Canonical wire bytes of the full message.
    pub fn encode(&self) -> Bytes {
        Bytes::from(canonical::message_bytes(self))
    }

    /// Decode a message from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        canonical::decode_message(bytes)
    }

    /// The event's self-addressing digest.
    pub fn said(&self) -> Said {
        self.event.said()
    }
}

fn sign_event(event: KeyEvent, signers: &[(u32, &Keypair)]) -> EventMessage {
    let said = event.said();
    let signatures = signers
        .iter()
        .map(|(index, keypair)| IndexedSignature {
            index: *index,
            signature: keypair.sign(said.as_bytes()),
        })
        .collect();
    EventMessage { event, signatures }
}

fn enumerate_signers<'a>(signers: &[&'a Keypair]) -> Vec<(u32, &'a Keypair)> {
    signers
        .iter()
        .enumerate()
        .map(|(i, kp)| (i as u32, *kp))
        .collect()
}

/// Builds signed inception messages.
///
/// The identifier is derived from the event itself, so it is available
/// only after `build_event` or `sign`.
pub struct InceptionBuilder {
    keys: Vec<Ed25519PublicKey>,
    threshold: SigningThreshold,
    next_digest: Said,
    witnesses: Vec<Ed25519PublicKey>,
    witness_threshold: u32,
    config: Vec<ConfigTrait>,
    anchors: Vec<Seal>,
    delegator: Option<Aid>,
}

impl InceptionBuilder {
    /// Start an inception with the initial keys and threshold.
    pub fn new(keys: Vec<Ed25519PublicKey>, threshold: SigningThreshold) -> Self {
        Self {
            keys,
            threshold,
            next_digest: Said::ZERO,
            witnesses: Vec::new(),
            witness_threshold: 0,
            config: Vec::new(),
            anchors: Vec::new(),
            delegator: None,
        }
    }

    /// Commit to the next key list. Without this the identifier is
    /// non-transferable: it can never rotate.
    pub fn next_keys(mut self, keys: Vec<Ed25519PublicKey>) -> Self {
        self.next_digest = key_commitment(&keys);
        self
    }

    /// Commit to a precomputed next-key digest.
    pub fn next_digest(mut self, digest: Said) -> Self {
        self.next_digest = digest;
        self
    }

    /// Declare the witness set and its receipt threshold.
    pub fn witnesses(mut self, witnesses: Vec<Ed25519PublicKey>, threshold: u32) -> Self {
        self.witnesses = witnesses;
        self.witness_threshold = threshold;
        self
    }

    /// Declare configuration traits.
    pub fn config(mut self, traits: Vec<ConfigTrait>) -> Self {
        self.config = traits;
        self
    }

    /// Anchor a seal into the inception.
    pub fn anchor(mut self, seal: Seal) -> Self {
        self.anchors.push(seal);
        self
    }

    /// Make this a delegated inception under the given delegator.
    pub fn delegator(mut self, aid: Aid) -> Self {
        self.delegator = Some(aid);
        self
    }

    /// Build the unsigned event with its derived identifier filled in.
    pub fn build_event(&self) -> KeyEvent {
        let kind = if self.delegator.is_some() {
            EventKind::DelegatedInception
        } else {
            EventKind::Inception
        };
        let mut event = KeyEvent {
            version: EVENT_VERSION,
            kind,
            aid: Aid::ZERO,
            seq: 0,
            prior: Said::ZERO,
            keys: self.keys.clone(),
            threshold: Some(self.threshold.clone()),
            next_digest: self.next_digest,
            witnesses: self.witnesses.clone(),
            witness_threshold: self.witness_threshold,
            witness_cuts: Vec::new(),
            witness_adds: Vec::new(),
            config: self.config.clone(),
            anchors: self.anchors.clone(),
            delegator: self.delegator,
        };
        event.aid = event.derived_aid();
        event
    }

    /// Sign with the given keypairs, indexed by their position in the
    /// slice. Use [`sign_indexed`](Self::sign_indexed) for partial
    /// multi-sig.
    pub fn sign(self, signers: &[&Keypair]) -> EventMessage {
        self.sign_indexed(&enumerate_signers(signers))
    }

    /// Sign with explicit key indices.
    pub fn sign_indexed(self, signers: &[(u32, &Keypair)]) -> EventMessage {
        sign_event(self.build_event(), signers)
    }
}

/// Builds signed rotation messages.
pub struct RotationBuilder {
    aid: Aid,
    seq: u64,
    prior: Said,
    keys: Vec<Ed25519PublicKey>,
    threshold: SigningThreshold,
    next_digest: Said,
    witness_threshold: u32,
    witness_cuts: Vec<Ed25519PublicKey>,
    witness_adds: Vec<Ed25519PublicKey>,
    anchors: Vec<Seal>,
    delegated: bool,
}

impl RotationBuilder {
    /// Start a rotation revealing `keys` as the new signing keys.
    pub fn new(
        aid: Aid,
        seq: u64,
        prior: Said,
        keys: Vec<Ed25519PublicKey>,
        threshold: SigningThreshold,
    ) -> Self {
        Self {
            aid,
            seq,
            prior,
            keys,
            threshold,
            next_digest: Said::ZERO,
            witness_threshold: 0,
            witness_cuts: Vec::new(),
            witness_adds: Vec::new(),
            anchors: Vec::new(),
            delegated: false,
        }
    }

    /// Commit to the key list after this one. Leaving this unset
    /// abandons the identifier: no further rotation will ever verify.
    pub fn next_keys(mut self, keys: Vec<Ed25519PublicKey>) -> Self {
        self.next_digest = key_commitment(&keys);
        self
    }

    /// Commit to a precomputed next-key digest.
    pub fn next_digest(mut self, digest: Said) -> Self {
        self.next_digest = digest;
        self
    }

    /// Witness threshold for the post-rotation witness set.
    pub fn witness_threshold(mut self, threshold: u32) -> Self {
        self.witness_threshold = threshold;
        self
    }

    /// Witnesses to remove.
    pub fn cuts(mut self, cuts: Vec<Ed25519PublicKey>) -> Self {
        self.witness_cuts = cuts;
        self
    }

    /// Witnesses to add.
    pub fn adds(mut self, adds: Vec<Ed25519PublicKey>) -> Self {
        self.witness_adds = adds;
        self
    }

    /// Anchor a seal into the rotation.
    pub fn anchor(mut self, seal: Seal) -> Self {
        self.anchors.push(seal);
        self
    }

    /// Make this a delegated rotation.
    pub fn delegated(mut self) -> Self {
        self.delegated = true;
        self
    }

    /// Build the unsigned event.
    pub fn build_event(&self) -> KeyEvent {
        let kind = if self.delegated {
            EventKind::DelegatedRotation
        } else {
            EventKind::Rotation
        };
        KeyEvent {
            version: EVENT_VERSION,
            kind,
            aid: self.aid,
            seq: self.seq,
            prior: self.prior,
            keys: self.keys.clone(),
            threshold: Some(self.threshold.clone()),
            next_digest: self.next_digest,
            witnesses: Vec::new(),
            witness_threshold: self.witness_threshold,
            witness_cuts: self.witness_cuts.clone(),
            witness_adds: self.witness_adds.clone(),
            config: Vec::new(),
            anchors: self.anchors.clone(),
            delegator: None,
        }
    }

    /// Sign with keypairs indexed by position. Rotation signatures count
    /// against the pre-rotation key list, so indices refer to the keys
    /// of the state being rotated away from.
    pub fn sign(self, signers: &[&Keypair]) -> EventMessage {
        self.sign_indexed(&enumerate_signers(signers))
    }

    /// Sign with explicit pre-rotation key indices.
    pub fn sign_indexed(self, signers: &[(u32, &Keypair)]) -> EventMessage {
        sign_event(self.build_event(), signers)
    }
}

/// Builds signed interaction messages.
pub struct InteractionBuilder {
    aid: Aid,
    seq: u64,
    prior: Said,
    anchors: Vec<Seal>,
}

impl InteractionBuilder {
    /// Start an interaction continuing the log at `seq`.
    pub fn new(aid: Aid, seq: u64, prior: Said) -> Self {
        Self {
            aid,
            seq,
            prior,
            anchors: Vec::new(),
        }
    }

    /// Anchor a seal.
    pub fn anchor(mut self, seal: Seal) -> Self {
        self.anchors.push(seal);
        self
    }

    /// Build the unsigned event.
    pub fn build_event(&self) -> KeyEvent {
        KeyEvent {
            version: EVENT_VERSION,
            kind: EventKind::Interaction,
            aid: self.aid,
            seq: self.seq,
            prior: self.prior,
            keys: Vec::new(),
            threshold: None,
            next_digest: Said::ZERO,
            witnesses: Vec::new(),
            witness_threshold: 0,
            witness_cuts: Vec::new(),
            witness_adds: Vec::new(),
            config: Vec::new(),
            anchors: self.anchors.clone(),
            delegator: None,
        }
    }

    /// Sign with keypairs indexed by position in the current key list.
    pub fn sign(self, signers: &[&Keypair]) -> EventMessage {
        self.sign_indexed(&enumerate_signers(signers))
    }

    /// Sign with explicit key indices.
    pub fn sign_indexed(self, signers: &[(u32, &Keypair)]) -> EventMessage {
        sign_event(self.build_event(), signers)
    }
}
