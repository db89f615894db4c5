//! End-to-end kernel tests: full log lifecycles over real storage.

use keridian::core::{ConfigTrait, ValidationError, Weight};
use keridian::store::{MemoryStore, SqliteStore, Store};
use keridian::{
    Aid, EventMessage, InceptionBuilder, InteractionBuilder, Kernel, KernelConfig, KernelError,
    Keypair, LogStatus, Receipt, ReceiptSubmitOutcome, RotationBuilder, Said, Seal,
    SigningThreshold, SubmitOutcome, WitnessStatus,
};

fn keypairs(seed: u8, count: usize) -> Vec<Keypair> {
    (0..count)
        .map(|i| {
            let mut s = [seed; 32];
            s[0] = i as u8;
            Keypair::from_seed(&s)
        })
        .collect()
}

fn memory_kernel() -> Kernel<MemoryStore> {
    Kernel::new(MemoryStore::new(), KernelConfig::default())
}

/// Inception with a single signer and a committed next key, no witnesses.
fn simple_inception(signer: &Keypair, next: &Keypair) -> EventMessage {
    InceptionBuilder::new(vec![signer.public_key()], SigningThreshold::simple(1))
        .next_keys(vec![next.public_key()])
        .sign(&[signer])
}

/// Interaction anchoring a tagged data seal, so each call produces a
/// distinct digest.
fn interaction(aid: Aid, seq: u64, prior: Said, tag: u8, signer: &Keypair) -> EventMessage {
    InteractionBuilder::new(aid, seq, prior)
        .anchor(Seal::data(Said::digest(&[tag])))
        .sign(&[signer])
}

fn accepted_state(outcome: SubmitOutcome) -> keridian::KeyState {
    match outcome {
        SubmitOutcome::Accepted { state, .. } => state,
        other => panic!("expected acceptance, got {:?}", other),
    }
}

#[tokio::test]
async fn test_incept_rotate_interact_lifecycle() {
    let kps = keypairs(0x10, 3);
    let kernel = memory_kernel();

    let icp = InceptionBuilder::new(vec![kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![kps[1].public_key()])
        .sign(&[&kps[0]]);
    let aid = icp.event.aid;

    let state = accepted_state(kernel.submit_message(&icp).await.unwrap());
    assert_eq!(state.seq, 0);
    assert_eq!(state.keys, vec![kps[0].public_key()]);

    // Rotate to the committed key, signing with the key being retired.
    let rot = RotationBuilder::new(
        aid,
        1,
        icp.said(),
        vec![kps[1].public_key()],
        SigningThreshold::simple(1),
    )
    .next_keys(vec![kps[2].public_key()])
    .sign(&[&kps[0]]);

    let state = accepted_state(kernel.submit_message(&rot).await.unwrap());
    assert_eq!(state.seq, 1);
    assert_eq!(state.keys, vec![kps[1].public_key()]);
    assert_eq!(state.last_establishment_seq, 1);

    // Interact with the new key.
    let ixn = interaction(aid, 2, rot.said(), 0x01, &kps[1]);
    let state = accepted_state(kernel.submit_message(&ixn).await.unwrap());
    assert_eq!(state.seq, 2);
    assert_eq!(state.keys, vec![kps[1].public_key()]);

    let log = kernel.load_log(&aid).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].said(), icp.said());
    assert_eq!(log[2].said(), ixn.said());
    assert_eq!(kernel.list_aids().await.unwrap(), vec![aid]);
}

#[tokio::test]
async fn test_resubmission_is_duplicate() {
    let kps = keypairs(0x11, 2);
    let kernel = memory_kernel();
    let icp = simple_inception(&kps[0], &kps[1]);

    assert!(matches!(
        kernel.submit_message(&icp).await.unwrap(),
        SubmitOutcome::Accepted { .. }
    ));
    assert_eq!(
        kernel.submit_message(&icp).await.unwrap(),
        SubmitOutcome::Duplicate
    );

    let state = kernel.key_state(&icp.event.aid).await.unwrap().unwrap();
    assert_eq!(state.seq, 0);
}

#[tokio::test]
async fn test_wire_submission() {
    let kps = keypairs(0x12, 2);
    let kernel = memory_kernel();
    let icp = simple_inception(&kps[0], &kps[1]);

    let outcome = kernel.submit_event(&icp.encode()).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));

    // Truncated bytes never reach validation.
    let bytes = icp.encode();
    let err = kernel.submit_event(&bytes[..bytes.len() - 1]).await;
    assert!(matches!(err, Err(KernelError::Codec(_))));
}

#[tokio::test]
async fn test_out_of_order_events_cascade() {
    let kps = keypairs(0x13, 2);
    let kernel = memory_kernel();

    let icp = simple_inception(&kps[0], &kps[1]);
    let aid = icp.event.aid;
    let mut chain = vec![icp];
    for seq in 1..=5 {
        let prior = chain.last().unwrap().said();
        chain.push(interaction(aid, seq, prior, seq as u8, &kps[0]));
    }

    accepted_state(kernel.submit_message(&chain[0]).await.unwrap());

    // Gap: 3 arrives while 1 and 2 are missing.
    assert_eq!(
        kernel.submit_message(&chain[3]).await.unwrap(),
        SubmitOutcome::Escrowed { ahead_by: 2 }
    );
    assert_eq!(
        kernel.submit_message(&chain[2]).await.unwrap(),
        SubmitOutcome::Escrowed { ahead_by: 1 }
    );

    // Filling the gap releases everything contiguous behind it.
    let state = accepted_state(kernel.submit_message(&chain[1]).await.unwrap());
    assert_eq!(state.seq, 3);

    assert_eq!(
        kernel.submit_message(&chain[5]).await.unwrap(),
        SubmitOutcome::Escrowed { ahead_by: 1 }
    );
    let state = accepted_state(kernel.submit_message(&chain[4]).await.unwrap());
    assert_eq!(state.seq, 5);

    assert_eq!(kernel.load_log(&aid).await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_escrow_overflow_reports_drop() {
    let kps = keypairs(0x14, 1);
    let kernel = Kernel::new(
        MemoryStore::new(),
        KernelConfig {
            escrow_limit: 2,
            ..KernelConfig::default()
        },
    );
    let aid = Aid::from_bytes([0x30; 32]);

    for seq in [2u64, 3] {
        let message = interaction(aid, seq, Said::digest(&[seq as u8]), seq as u8, &kps[0]);
        assert!(matches!(
            kernel.submit_message(&message).await.unwrap(),
            SubmitOutcome::Escrowed { .. }
        ));
    }

    let overflow = interaction(aid, 4, Said::digest(&[4]), 4, &kps[0]);
    let err = kernel.submit_message(&overflow).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::OutOfOrderOverflow { seq: 4, limit: 2, .. }
    ));
}

#[tokio::test]
async fn test_duplicity_condemns_log() {
    let kps = keypairs(0x15, 2);
    let kernel = memory_kernel();

    let icp = simple_inception(&kps[0], &kps[1]);
    let aid = icp.event.aid;
    let ixn = interaction(aid, 1, icp.said(), 0x01, &kps[0]);
    // Same slot, same keys, different content: two versions of history.
    let divergent = interaction(aid, 1, icp.said(), 0x02, &kps[0]);

    kernel.submit_message(&icp).await.unwrap();
    kernel.submit_message(&ixn).await.unwrap();

    let err = kernel.submit_message(&divergent).await.unwrap_err();
    assert!(matches!(err, KernelError::Duplicity { seq: 1, .. }));

    let state = kernel.key_state(&aid).await.unwrap().unwrap();
    assert_eq!(state.status, LogStatus::Compromised);

    let records = kernel.duplicity_records(&aid).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].seq, 1);
    assert_eq!(records[0].accepted, ixn.said());
    assert_eq!(records[0].observed, divergent.said());

    // Nothing further is accepted, valid or not.
    let ixn2 = interaction(aid, 2, ixn.said(), 0x03, &kps[0]);
    let err = kernel.submit_message(&ixn2).await.unwrap_err();
    assert!(matches!(err, KernelError::Compromised(a) if a == aid));
}

#[tokio::test]
async fn test_unverifiable_conflict_does_not_condemn() {
    let kps = keypairs(0x16, 2);
    let stranger = Keypair::from_seed(&[0x66; 32]);
    let kernel = memory_kernel();

    let icp = simple_inception(&kps[0], &kps[1]);
    let aid = icp.event.aid;
    let ixn = interaction(aid, 1, icp.said(), 0x01, &kps[0]);
    kernel.submit_message(&icp).await.unwrap();
    kernel.submit_message(&ixn).await.unwrap();

    // A conflicting event only a stranger signed is noise, not evidence.
    let forged = interaction(aid, 1, icp.said(), 0x02, &stranger);
    let err = kernel.submit_message(&forged).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::SignatureFailed)
    ));

    let state = kernel.key_state(&aid).await.unwrap().unwrap();
    assert_eq!(state.status, LogStatus::Established);
    assert!(kernel.duplicity_records(&aid).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_witness_receipts_accumulate_to_threshold() {
    let kps = keypairs(0x17, 2);
    let wits = keypairs(0x40, 3);
    let kernel = memory_kernel();

    let icp = InceptionBuilder::new(vec![kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![kps[1].public_key()])
        .witnesses(wits.iter().map(|w| w.public_key()).collect(), 2)
        .sign(&[&kps[0]]);
    let aid = icp.event.aid;
    let said = icp.said();

    let outcome = kernel.submit_message(&icp).await.unwrap();
    assert!(matches!(
        outcome,
        SubmitOutcome::Accepted {
            fully_witnessed: false,
            ..
        }
    ));
    assert_eq!(
        kernel.witness_status(&aid, &said).await.unwrap(),
        Some(WitnessStatus::UnderWitnessed { have: 0, need: 2 })
    );

    let r0 = Receipt::sign(aid, 0, said, &wits[0]);
    assert_eq!(
        kernel.submit_receipt(&r0).await.unwrap(),
        ReceiptSubmitOutcome::Accepted {
            fully_witnessed: false
        }
    );
    assert_eq!(
        kernel.submit_receipt_bytes(&r0.encode()).await.unwrap(),
        ReceiptSubmitOutcome::DuplicateWitness
    );

    let r1 = Receipt::sign(aid, 0, said, &wits[1]);
    assert_eq!(
        kernel.submit_receipt(&r1).await.unwrap(),
        ReceiptSubmitOutcome::Accepted {
            fully_witnessed: true
        }
    );
    assert_eq!(
        kernel.witness_status(&aid, &said).await.unwrap(),
        Some(WitnessStatus::FullyWitnessed)
    );
    assert_eq!(kernel.store().receipt_count(&said).await.unwrap(), 2);
}

#[tokio::test]
async fn test_receipt_before_event_counts_on_acceptance() {
    let kps = keypairs(0x18, 2);
    let wits = keypairs(0x41, 1);
    let kernel = memory_kernel();

    let icp = InceptionBuilder::new(vec![kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![kps[1].public_key()])
        .witnesses(vec![wits[0].public_key()], 1)
        .sign(&[&kps[0]]);
    let aid = icp.event.aid;
    let said = icp.said();

    // The witness is faster than the controller.
    let receipt = Receipt::sign(aid, 0, said, &wits[0]);
    assert_eq!(
        kernel.submit_receipt(&receipt).await.unwrap(),
        ReceiptSubmitOutcome::Escrowed
    );

    let outcome = kernel.submit_message(&icp).await.unwrap();
    assert!(matches!(
        outcome,
        SubmitOutcome::Accepted {
            fully_witnessed: true,
            ..
        }
    ));
    assert_eq!(
        kernel.witness_status(&aid, &said).await.unwrap(),
        Some(WitnessStatus::FullyWitnessed)
    );
}

#[tokio::test]
async fn test_receipt_from_unlisted_witness_rejected() {
    let kps = keypairs(0x19, 2);
    let wits = keypairs(0x42, 1);
    let outsider = Keypair::from_seed(&[0x77; 32]);
    let kernel = memory_kernel();

    let icp = InceptionBuilder::new(vec![kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![kps[1].public_key()])
        .witnesses(vec![wits[0].public_key()], 1)
        .sign(&[&kps[0]]);
    let aid = icp.event.aid;
    let said = icp.said();
    kernel.submit_message(&icp).await.unwrap();

    let receipt = Receipt::sign(aid, 0, said, &outsider);
    let err = kernel.submit_receipt(&receipt).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::UnknownWitness)
    ));
}

#[tokio::test]
async fn test_escrowed_outsider_receipt_dropped_on_acceptance() {
    let kps = keypairs(0x1a, 2);
    let wits = keypairs(0x43, 1);
    let outsider = Keypair::from_seed(&[0x78; 32]);
    let kernel = memory_kernel();

    let icp = InceptionBuilder::new(vec![kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![kps[1].public_key()])
        .witnesses(vec![wits[0].public_key()], 1)
        .sign(&[&kps[0]]);
    let aid = icp.event.aid;
    let said = icp.said();

    // Before the event arrives the witness set is unknown, so the
    // outsider's receipt can only be buffered.
    let receipt = Receipt::sign(aid, 0, said, &outsider);
    assert_eq!(
        kernel.submit_receipt(&receipt).await.unwrap(),
        ReceiptSubmitOutcome::Escrowed
    );

    // On acceptance it turns out not to be from a listed witness.
    kernel.submit_message(&icp).await.unwrap();
    assert_eq!(
        kernel.witness_status(&aid, &said).await.unwrap(),
        Some(WitnessStatus::UnderWitnessed { have: 0, need: 1 })
    );
}

#[tokio::test]
async fn test_weighted_multisig_inception() {
    let kps = keypairs(0x1b, 3);
    let next = keypairs(0x1c, 3);
    let kernel = memory_kernel();

    let half = Weight::new(1, 2).unwrap();
    let icp = InceptionBuilder::new(
        kps.iter().map(|k| k.public_key()).collect(),
        SigningThreshold::weighted(vec![vec![half, half, half]]),
    )
    .next_keys(next.iter().map(|k| k.public_key()).collect())
    .sign_indexed(&[(0, &kps[0]), (2, &kps[2])]);

    let state = accepted_state(kernel.submit_message(&icp).await.unwrap());
    assert_eq!(state.keys.len(), 3);
}

#[tokio::test]
async fn test_delegated_inception_requires_anchor() {
    let del_kps = keypairs(0x1d, 2);
    let child_kps = keypairs(0x1e, 2);
    let kernel = memory_kernel();

    let del_icp = simple_inception(&del_kps[0], &del_kps[1]);
    let del_aid = del_icp.event.aid;
    kernel.submit_message(&del_icp).await.unwrap();

    let dip = InceptionBuilder::new(vec![child_kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![child_kps[1].public_key()])
        .delegator(del_aid)
        .sign(&[&child_kps[0]]);
    let child_aid = dip.event.aid;

    // No seal in the delegator's log yet.
    let err = kernel.submit_message(&dip).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::DelegationNotAnchored)
    ));

    // The delegator anchors the delegated inception, then it applies.
    let anchor = InteractionBuilder::new(del_aid, 1, del_icp.said())
        .anchor(Seal::event(child_aid, 0, dip.said()))
        .sign(&[&del_kps[0]]);
    kernel.submit_message(&anchor).await.unwrap();

    let state = accepted_state(kernel.submit_message(&dip).await.unwrap());
    assert_eq!(state.delegator, Some(del_aid));
    assert_eq!(state.seq, 0);
}

#[tokio::test]
async fn test_delegation_forbidden_by_delegator_config() {
    let del_kps = keypairs(0x1f, 2);
    let child_kps = keypairs(0x20, 2);
    let kernel = memory_kernel();

    let del_icp = InceptionBuilder::new(vec![del_kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![del_kps[1].public_key()])
        .config(vec![ConfigTrait::DoNotDelegate])
        .sign(&[&del_kps[0]]);
    let del_aid = del_icp.event.aid;
    kernel.submit_message(&del_icp).await.unwrap();

    let dip = InceptionBuilder::new(vec![child_kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![child_kps[1].public_key()])
        .delegator(del_aid)
        .sign(&[&child_kps[0]]);

    // Even an anchored seal does not override the delegator's refusal.
    let anchor = InteractionBuilder::new(del_aid, 1, del_icp.said())
        .anchor(Seal::event(dip.event.aid, 0, dip.said()))
        .sign(&[&del_kps[0]]);
    kernel.submit_message(&anchor).await.unwrap();

    let err = kernel.submit_message(&dip).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::DelegationForbidden)
    ));
}

#[tokio::test]
async fn test_compromised_delegator_cannot_delegate() {
    let del_kps = keypairs(0x23, 2);
    let child_kps = keypairs(0x24, 2);
    let kernel = memory_kernel();

    let del_icp = simple_inception(&del_kps[0], &del_kps[1]);
    let del_aid = del_icp.event.aid;
    kernel.submit_message(&del_icp).await.unwrap();

    let dip = InceptionBuilder::new(vec![child_kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![child_kps[1].public_key()])
        .delegator(del_aid)
        .sign(&[&child_kps[0]]);
    let child_aid = dip.event.aid;

    // The delegator anchors the seal, then gets condemned for
    // publishing a second version of the same slot.
    let anchor = InteractionBuilder::new(del_aid, 1, del_icp.said())
        .anchor(Seal::event(child_aid, 0, dip.said()))
        .sign(&[&del_kps[0]]);
    kernel.submit_message(&anchor).await.unwrap();

    let divergent = interaction(del_aid, 1, del_icp.said(), 0x09, &del_kps[0]);
    let err = kernel.submit_message(&divergent).await.unwrap_err();
    assert!(matches!(err, KernelError::Duplicity { seq: 1, .. }));
    let del_state = kernel.key_state(&del_aid).await.unwrap().unwrap();
    assert_eq!(del_state.status, LogStatus::Compromised);

    // The pre-condemnation anchor no longer approves anything.
    let err = kernel.submit_message(&dip).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::DelegatorCompromised)
    ));
    assert!(kernel.key_state(&child_aid).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delegated_rotation_requires_anchor() {
    let del_kps = keypairs(0x25, 2);
    let child_kps = keypairs(0x26, 3);
    let kernel = memory_kernel();

    let del_icp = simple_inception(&del_kps[0], &del_kps[1]);
    let del_aid = del_icp.event.aid;
    kernel.submit_message(&del_icp).await.unwrap();

    let dip = InceptionBuilder::new(vec![child_kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![child_kps[1].public_key()])
        .delegator(del_aid)
        .sign(&[&child_kps[0]]);
    let child_aid = dip.event.aid;

    let anchor_icp = InteractionBuilder::new(del_aid, 1, del_icp.said())
        .anchor(Seal::event(child_aid, 0, dip.said()))
        .sign(&[&del_kps[0]]);
    kernel.submit_message(&anchor_icp).await.unwrap();
    kernel.submit_message(&dip).await.unwrap();

    // A delegated rotation needs its own seal, not just the inception's.
    let drt = RotationBuilder::new(
        child_aid,
        1,
        dip.said(),
        vec![child_kps[1].public_key()],
        SigningThreshold::simple(1),
    )
    .next_keys(vec![child_kps[2].public_key()])
    .delegated()
    .sign(&[&child_kps[0]]);

    let err = kernel.submit_message(&drt).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::DelegationNotAnchored)
    ));

    let anchor_rot = InteractionBuilder::new(del_aid, 2, anchor_icp.said())
        .anchor(Seal::event(child_aid, 1, drt.said()))
        .sign(&[&del_kps[0]]);
    kernel.submit_message(&anchor_rot).await.unwrap();

    let state = accepted_state(kernel.submit_message(&drt).await.unwrap());
    assert_eq!(state.seq, 1);
    assert_eq!(state.keys, vec![child_kps[1].public_key()]);
    assert_eq!(state.delegator, Some(del_aid));
    assert_eq!(state.last_establishment_seq, 1);
}

#[tokio::test]
async fn test_sqlite_restart_replays_log() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("kel.db");

    let kps = keypairs(0x21, 3);
    let wits = keypairs(0x44, 1);

    let icp = InceptionBuilder::new(vec![kps[0].public_key()], SigningThreshold::simple(1))
        .next_keys(vec![kps[1].public_key()])
        .witnesses(vec![wits[0].public_key()], 1)
        .sign(&[&kps[0]]);
    let aid = icp.event.aid;
    let icp_said = icp.said();

    let rot = RotationBuilder::new(
        aid,
        1,
        icp_said,
        vec![kps[1].public_key()],
        SigningThreshold::simple(1),
    )
    .next_keys(vec![kps[2].public_key()])
    .witness_threshold(1)
    .sign(&[&kps[0]]);

    let ixn = interaction(aid, 2, rot.said(), 0x05, &kps[1]);

    {
        let kernel = Kernel::new(SqliteStore::open(&path)?, KernelConfig::default());
        kernel.submit_message(&icp).await?;
        kernel
            .submit_receipt(&Receipt::sign(aid, 0, icp_said, &wits[0]))
            .await?;
        kernel.submit_message(&rot).await?;
        kernel.submit_message(&ixn).await?;
    }

    // A fresh kernel over the same file rebuilds identical state.
    let kernel = Kernel::new(SqliteStore::open(&path)?, KernelConfig::default());
    let state = kernel.key_state(&aid).await?.expect("log should persist");
    assert_eq!(state.seq, 2);
    assert_eq!(state.keys, vec![kps[1].public_key()]);
    assert_eq!(state.status, LogStatus::Established);
    assert_eq!(state.last_establishment_seq, 1);

    assert_eq!(
        kernel.witness_status(&aid, &icp_said).await?,
        Some(WitnessStatus::FullyWitnessed)
    );
    assert_eq!(kernel.load_log(&aid).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_duplicity_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("kel.db");

    let kps = keypairs(0x22, 2);
    let icp = simple_inception(&kps[0], &kps[1]);
    let aid = icp.event.aid;
    let ixn = interaction(aid, 1, icp.said(), 0x01, &kps[0]);
    let divergent = interaction(aid, 1, icp.said(), 0x02, &kps[0]);

    {
        let kernel = Kernel::new(SqliteStore::open(&path)?, KernelConfig::default());
        kernel.submit_message(&icp).await?;
        kernel.submit_message(&ixn).await?;
        assert!(kernel.submit_message(&divergent).await.is_err());
    }

    // Condemnation is permanent, not a property of one process.
    let kernel = Kernel::new(SqliteStore::open(&path)?, KernelConfig::default());
    let state = kernel.key_state(&aid).await?.expect("log should persist");
    assert_eq!(state.status, LogStatus::Compromised);

    let ixn2 = interaction(aid, 2, ixn.said(), 0x03, &kps[0]);
    let err = kernel.submit_message(&ixn2).await.unwrap_err();
    assert!(matches!(err, KernelError::Compromised(a) if a == aid));
    Ok(())
}
