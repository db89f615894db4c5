//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keridian_core::{
    Aid, Ed25519PublicKey, EventKind, EventMessage, InceptionBuilder, Keypair, Said, Seal,
    SigningThreshold, Weight,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Aid.
pub fn aid() -> impl Strategy<Value = Aid> {
    any::<[u8; 32]>().prop_map(Aid::from_bytes)
}

/// Generate a random Said.
pub fn said() -> impl Strategy<Value = Said> {
    any::<[u8; 32]>().prop_map(Said::from_bytes)
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a sequence number in a realistic log range.
pub fn seq() -> impl Strategy<Value = u64> {
    0u64..=1000
}

/// Generate a valid weight, `num/den` with `num <= den`.
pub fn weight() -> impl Strategy<Value = Weight> {
    (1u64..=12).prop_flat_map(|den| {
        (0u64..=den).prop_map(move |num| {
            Weight::new(num, den).expect("num <= den is a valid weight")
        })
    })
}

/// Generate an EventKind.
pub fn event_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Inception),
        Just(EventKind::Rotation),
        Just(EventKind::Interaction),
        Just(EventKind::DelegatedInception),
        Just(EventKind::DelegatedRotation),
    ]
}

/// Generate a seal: an event seal or a bare data seal.
pub fn seal() -> impl Strategy<Value = Seal> {
    prop_oneof![
        (aid(), seq(), said()).prop_map(|(aid, seq, said)| Seal::event(aid, seq, said)),
        said().prop_map(Seal::data),
    ]
}

/// Parameters for generating a signed inception.
///
/// Keys are derived from the base seed by index, so generated key lists
/// and witness sets are always duplicate-free, even under shrinking.
#[derive(Debug, Clone)]
pub struct InceptionParams {
    pub base_seed: [u8; 32],
    pub key_count: usize,
    pub witness_count: usize,
    pub witness_threshold: u32,
    pub anchors: Vec<Seal>,
}

impl Arbitrary for InceptionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            1usize..=4,
            0usize..=3,
            prop::collection::vec(seal(), 0..=2),
        )
            .prop_flat_map(|(base_seed, key_count, witness_count, anchors)| {
                let threshold = if witness_count == 0 {
                    Just(0u32).boxed()
                } else {
                    (1u32..=witness_count as u32).boxed()
                };
                threshold.prop_map(move |witness_threshold| InceptionParams {
                    base_seed,
                    key_count,
                    witness_count,
                    witness_threshold,
                    anchors: anchors.clone(),
                })
            })
            .boxed()
    }
}

/// Derive the signing keypairs for a parameter set.
pub fn signing_keypairs(params: &InceptionParams) -> Vec<Keypair> {
    (0..params.key_count)
        .map(|i| derived_keypair(&params.base_seed, 0x01, i))
        .collect()
}

/// Generate a fully signed inception from parameters.
pub fn inception_from_params(params: &InceptionParams) -> EventMessage {
    let signers = signing_keypairs(params);
    let next: Vec<Ed25519PublicKey> = (0..params.key_count)
        .map(|i| derived_keypair(&params.base_seed, 0x02, i).public_key())
        .collect();
    let witnesses: Vec<Ed25519PublicKey> = (0..params.witness_count)
        .map(|i| derived_keypair(&params.base_seed, 0x03, i).public_key())
        .collect();

    let mut builder = InceptionBuilder::new(
        signers.iter().map(|k| k.public_key()).collect(),
        SigningThreshold::simple(params.key_count as u64),
    )
    .next_keys(next)
    .witnesses(witnesses, params.witness_threshold);
    for seal in &params.anchors {
        builder = builder.anchor(*seal);
    }

    let refs: Vec<&Keypair> = signers.iter().collect();
    builder.sign(&refs)
}

fn derived_keypair(base: &[u8; 32], role: u8, index: usize) -> Keypair {
    let mut seed = *base;
    seed[0] = seed[0].wrapping_add(index as u8);
    seed[1] ^= role;
    Keypair::from_seed(&seed)
}
