//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use keridian_core::{
    Aid, Ed25519PublicKey, EventMessage, InceptionBuilder, InteractionBuilder, Keypair, Receipt,
    RotationBuilder, Said, Seal, SigningThreshold,
};

/// A scripted identity with deterministic key generations.
///
/// The fixture derives every key generation from one seed byte, so a
/// rotation always reveals exactly the keys the previous establishment
/// event committed to. Events come out chained and signed; feed them to
/// a kernel in order (or out of order, for escrow tests).
pub struct IdentityFixture {
    seed: u8,
    key_count: usize,
    /// Which key generation currently signs.
    generation: u64,
    threshold: SigningThreshold,
    witnesses: Vec<Keypair>,
    witness_threshold: u32,
    delegator: Option<Aid>,
    inception: EventMessage,
    aid: Aid,
    seq: u64,
    head: Said,
}

impl IdentityFixture {
    /// A single-key identity with no witnesses.
    pub fn new(seed: u8) -> Self {
        Self::build(seed, 1, 0, 0, None)
    }

    /// An identity with `key_count` keys, all required to sign.
    pub fn multisig(seed: u8, key_count: usize) -> Self {
        Self::build(seed, key_count, 0, 0, None)
    }

    /// A single-key identity with a witness pool and receipt threshold.
    pub fn with_witnesses(seed: u8, witness_count: usize, witness_threshold: u32) -> Self {
        Self::build(seed, 1, witness_count, witness_threshold, None)
    }

    /// A single-key identity delegated under `delegator`.
    pub fn delegated(seed: u8, delegator: Aid) -> Self {
        Self::build(seed, 1, 0, 0, Some(delegator))
    }

    fn build(
        seed: u8,
        key_count: usize,
        witness_count: usize,
        witness_threshold: u32,
        delegator: Option<Aid>,
    ) -> Self {
        let threshold = SigningThreshold::simple(key_count as u64);
        let current = controller_keys(seed, 0, key_count);
        let next = controller_keys(seed, 1, key_count);
        let witnesses: Vec<Keypair> = (0..witness_count).map(|i| witness_key(seed, i)).collect();

        let mut builder = InceptionBuilder::new(public_keys(&current), threshold.clone())
            .next_keys(public_keys(&next))
            .witnesses(
                witnesses.iter().map(|w| w.public_key()).collect(),
                witness_threshold,
            );
        if let Some(delegator) = delegator {
            builder = builder.delegator(delegator);
        }
        let inception = builder.sign(&borrow_all(&current));

        let aid = inception.event.aid;
        let head = inception.said();
        Self {
            seed,
            key_count,
            generation: 0,
            threshold,
            witnesses,
            witness_threshold,
            delegator,
            inception,
            aid,
            seq: 0,
            head,
        }
    }

    pub fn aid(&self) -> Aid {
        self.aid
    }

    /// Digest of the chain's latest event.
    pub fn head(&self) -> Said {
        self.head
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The signed inception message. Always the same message; the chain
    /// starts here no matter how far it has advanced.
    pub fn inception(&self) -> EventMessage {
        self.inception.clone()
    }

    /// Public keys of the generation currently signing.
    pub fn current_keys(&self) -> Vec<Ed25519PublicKey> {
        public_keys(&controller_keys(self.seed, self.generation, self.key_count))
    }

    pub fn witness_keys(&self) -> Vec<Ed25519PublicKey> {
        self.witnesses.iter().map(|w| w.public_key()).collect()
    }

    /// Rotate to the committed next generation and commit the one after.
    pub fn rotate(&mut self) -> EventMessage {
        let committed = controller_keys(self.seed, self.generation + 2, self.key_count);
        self.rotation_with_next(Some(public_keys(&committed)))
    }

    /// Rotate to the committed next generation with no further
    /// commitment. The identity can never rotate again.
    pub fn abandon(&mut self) -> EventMessage {
        self.rotation_with_next(None)
    }

    fn rotation_with_next(&mut self, next: Option<Vec<Ed25519PublicKey>>) -> EventMessage {
        let signers = controller_keys(self.seed, self.generation, self.key_count);
        let revealed = controller_keys(self.seed, self.generation + 1, self.key_count);

        self.seq += 1;
        let mut builder = RotationBuilder::new(
            self.aid,
            self.seq,
            self.head,
            public_keys(&revealed),
            self.threshold.clone(),
        )
        .witness_threshold(self.witness_threshold);
        if let Some(next) = next {
            builder = builder.next_keys(next);
        }
        if self.delegator.is_some() {
            builder = builder.delegated();
        }
        let message = builder.sign(&borrow_all(&signers));

        self.head = message.said();
        self.generation += 1;
        message
    }

    /// Interaction anchoring the payload's digest as a data seal.
    pub fn interact(&mut self, payload: &[u8]) -> EventMessage {
        self.anchor(Seal::data(Said::digest(payload)))
    }

    /// Interaction anchoring an arbitrary seal. Used by delegators to
    /// approve a delegated event.
    pub fn anchor(&mut self, seal: Seal) -> EventMessage {
        let signers = controller_keys(self.seed, self.generation, self.key_count);
        self.seq += 1;
        let message = InteractionBuilder::new(self.aid, self.seq, self.head)
            .anchor(seal)
            .sign(&borrow_all(&signers));
        self.head = message.said();
        message
    }

    /// A receipt for `message` from the fixture's witness at `index`.
    pub fn receipt(&self, index: usize, message: &EventMessage) -> Receipt {
        Receipt::sign(
            self.aid,
            message.event.seq,
            message.said(),
            &self.witnesses[index],
        )
    }

    /// Receipts for `message` from every witness in the pool.
    pub fn receipts_for(&self, message: &EventMessage) -> Vec<Receipt> {
        (0..self.witnesses.len())
            .map(|i| self.receipt(i, message))
            .collect()
    }
}

/// Create independent identities for multi-party tests.
pub fn controllers(count: usize) -> Vec<IdentityFixture> {
    (0..count).map(|i| IdentityFixture::new(i as u8)).collect()
}

fn controller_keys(seed: u8, generation: u64, count: usize) -> Vec<Keypair> {
    (0..count)
        .map(|index| {
            let mut s = [seed; 32];
            s[0] = generation as u8;
            s[1] = index as u8;
            s[2] = 0xc0;
            Keypair::from_seed(&s)
        })
        .collect()
}

fn witness_key(seed: u8, index: usize) -> Keypair {
    let mut s = [seed; 32];
    s[0] = index as u8;
    s[2] = 0x57;
    Keypair::from_seed(&s)
}

fn public_keys(keypairs: &[Keypair]) -> Vec<Ed25519PublicKey> {
    keypairs.iter().map(|k| k.public_key()).collect()
}

fn borrow_all(keypairs: &[Keypair]) -> Vec<&Keypair> {
    keypairs.iter().collect()
}
