//! The kernel: unified API for maintaining key event logs.
//!
//! The kernel ties validation, storage, witnessing, and duplicity
//! detection into one interface. Events and receipts come in as wire
//! bytes or decoded values; verified key state and evidence come out.
//!
//! Internally each identifier gets its own serialized context holding
//! the derived key state, the out-of-order buffer, the receipt ledger,
//! and the accepted-digest map. Key state is never persisted: on the
//! first touch of an identifier the kernel replays its stored log and
//! rebuilds everything, so storage stays the single source of truth.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use keridian_core::{
    verify_signatures, Aid, ConfigTrait, DuplicityCheck, DuplicityDetector, EscrowOutcome,
    EventMessage, KeyState, LogStatus, OutOfOrderEscrow, Receipt, ReceiptEscrow, ReceiptOutcome,
    ReceiptTracker, Said, ValidationError, Verdict,
};
use keridian_store::{DuplicityRecord, EventRecord, InsertOutcome, Store};

use crate::error::{KernelError, Result};

/// Configuration for the kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Maximum out-of-order events buffered per identifier.
    pub escrow_limit: usize,
    /// Maximum distinct event digests with buffered receipts per identifier.
    pub receipt_escrow_limit: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            escrow_limit: 64,
            receipt_escrow_limit: 256,
        }
    }
}

/// The main kernel struct.
///
/// Provides a unified API for:
/// - Submitting key events and witness receipts
/// - Querying key state and accepted logs
/// - Witness accounting
/// - Duplicity evidence
pub struct Kernel<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: KernelConfig,
    /// Per-identifier contexts. The outer lock only guards the map; each
    /// context has its own lock so identifiers proceed independently.
    logs: Mutex<HashMap<Aid, Arc<Mutex<AidLog>>>>,
}

/// In-memory context for one identifier, rebuilt from storage on first
/// touch.
struct AidLog {
    /// Derived key state; `None` until an inception is accepted.
    state: Option<KeyState>,
    /// Events ahead of the head, waiting for the gap to close.
    escrow: OutOfOrderEscrow,
    /// Receipts for digests we have not accepted yet.
    orphan_receipts: ReceiptEscrow,
    /// Receipt accounting for accepted events.
    tracker: ReceiptTracker,
    /// Accepted digests per sequence number.
    detector: DuplicityDetector,
    /// Whether the stored log has been replayed into this context.
    loaded: bool,
}

impl AidLog {
    fn new(config: &KernelConfig) -> Self {
        Self {
            state: None,
            escrow: OutOfOrderEscrow::new(config.escrow_limit),
            orphan_receipts: ReceiptEscrow::new(config.receipt_escrow_limit),
            tracker: ReceiptTracker::new(),
            detector: DuplicityDetector::new(),
            loaded: false,
        }
    }
}

impl<S: Store> Kernel<S> {
    /// Create a new kernel instance.
    pub fn new(store: S, config: KernelConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a key event from its wire bytes.
    pub async fn submit_event(&self, bytes: &[u8]) -> Result<SubmitOutcome> {
        let message = EventMessage::decode(bytes)?;
        self.submit_message(&message).await
    }

    /// Submit an already-decoded key event message.
    ///
    /// Acceptance is all or nothing: on any rejection the log, the key
    /// state, and the stored evidence are exactly as they were before
    /// the call. An event ahead of the head is buffered and retried when
    /// the gap closes; an event equal to an accepted one is a harmless
    /// `Duplicate`; a verifiable conflicting version condemns the log.
    pub async fn submit_message(&self, message: &EventMessage) -> Result<SubmitOutcome> {
        let aid = message.event.aid;
        let handle = self.log_handle(aid).await;
        let mut log = handle.lock().await;
        self.ensure_loaded(aid, &mut log).await?;

        if let Some(state) = &log.state {
            if state.status == LogStatus::Compromised {
                return Err(KernelError::Compromised(aid));
            }
        }

        let current = log.state.clone();
        match current {
            None => {
                if message.event.seq == 0 {
                    let state = self.validate_next(None, message).await?;
                    let fully = self.commit_event(&mut log, message, state).await?;
                    self.drain_escrow(&mut log).await?;
                    self.accepted(&log, fully)
                } else {
                    self.buffer_ahead(&mut log, message, 0)
                }
            }
            Some(state) => {
                let next_expected = state.seq + 1;
                let seq = message.event.seq;
                if seq < next_expected {
                    self.check_stale(&mut log, &state, message).await
                } else if seq == next_expected {
                    let new_state = self.validate_next(Some(&state), message).await?;
                    let fully = self.commit_event(&mut log, message, new_state).await?;
                    self.drain_escrow(&mut log).await?;
                    self.accepted(&log, fully)
                } else {
                    self.buffer_ahead(&mut log, message, next_expected)
                }
            }
        }
    }

    /// Submit a witness receipt from its wire bytes.
    pub async fn submit_receipt_bytes(&self, bytes: &[u8]) -> Result<ReceiptSubmitOutcome> {
        let receipt = Receipt::decode(bytes)?;
        self.submit_receipt(&receipt).await
    }

    /// Submit an already-decoded witness receipt.
    ///
    /// A receipt naming a digest the log has not accepted is verified
    /// and buffered; it counts as soon as the event arrives.
    pub async fn submit_receipt(&self, receipt: &Receipt) -> Result<ReceiptSubmitOutcome> {
        let aid = receipt.aid;
        let handle = self.log_handle(aid).await;
        let mut log = handle.lock().await;
        self.ensure_loaded(aid, &mut log).await?;

        if let Some(state) = &log.state {
            if state.status == LogStatus::Compromised {
                return Err(KernelError::Compromised(aid));
            }
        }

        match log.tracker.record(receipt) {
            Ok(ReceiptOutcome::Accepted) => {
                self.store.add_receipt(receipt, now_millis()).await?;
                let fully = log.tracker.fully_witnessed(&receipt.said).unwrap_or(false);
                if fully {
                    tracing::debug!("Event {} fully witnessed", receipt.said);
                }
                Ok(ReceiptSubmitOutcome::Accepted {
                    fully_witnessed: fully,
                })
            }
            Ok(ReceiptOutcome::Duplicate) => {
                self.store.add_receipt(receipt, now_millis()).await?;
                Ok(ReceiptSubmitOutcome::DuplicateWitness)
            }
            Ok(ReceiptOutcome::UnknownEvent) => {
                receipt.verify().map_err(ValidationError::from)?;
                log.orphan_receipts.insert(receipt.clone());
                tracing::debug!("Escrowed receipt for unknown event {}", receipt.said);
                Ok(ReceiptSubmitOutcome::Escrowed)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Current key state for an identifier, or `None` for an empty log.
    pub async fn key_state(&self, aid: &Aid) -> Result<Option<KeyState>> {
        let handle = self.log_handle(*aid).await;
        let mut log = handle.lock().await;
        self.ensure_loaded(*aid, &mut log).await?;
        Ok(log.state.clone())
    }

    /// The full accepted log for an identifier, decoded, in order.
    pub async fn load_log(&self, aid: &Aid) -> Result<Vec<EventMessage>> {
        let records = self.store.load_log(aid).await?;
        records.iter().map(decode_record).collect()
    }

    /// Witnessing progress for an accepted event, or `None` if the
    /// digest is not an accepted event of this identifier.
    pub async fn witness_status(&self, aid: &Aid, said: &Said) -> Result<Option<WitnessStatus>> {
        let handle = self.log_handle(*aid).await;
        let mut log = handle.lock().await;
        self.ensure_loaded(*aid, &mut log).await?;

        let Some(need) = log.tracker.threshold_for(said) else {
            return Ok(None);
        };
        let have = log.tracker.receipt_count(said) as u32;
        Ok(Some(if have >= need {
            WitnessStatus::FullyWitnessed
        } else {
            WitnessStatus::UnderWitnessed { have, need }
        }))
    }

    /// All duplicity evidence recorded for an identifier.
    pub async fn duplicity_records(&self, aid: &Aid) -> Result<Vec<DuplicityRecord>> {
        Ok(self.store.duplicity_records(aid).await?)
    }

    /// All identifiers with an accepted log.
    pub async fn list_aids(&self) -> Result<Vec<Aid>> {
        Ok(self.store.list_aids().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Get or create the context for an identifier.
    async fn log_handle(&self, aid: Aid) -> Arc<Mutex<AidLog>> {
        let mut logs = self.logs.lock().await;
        logs.entry(aid)
            .or_insert_with(|| Arc::new(Mutex::new(AidLog::new(&self.config))))
            .clone()
    }

    /// Replay the stored log into a fresh context.
    async fn ensure_loaded(&self, aid: Aid, log: &mut AidLog) -> Result<()> {
        if log.loaded {
            return Ok(());
        }

        let records = self.store.load_log(&aid).await?;
        let replayed = records.len();
        for record in records {
            let message = decode_record(&record)?;
            let state = match &log.state {
                None => KeyState::incept(&message),
                Some(prior) => prior.apply(&message),
            }
            .map_err(|e| {
                KernelError::Corrupt(format!(
                    "stored log for {} fails replay at seq {}: {}",
                    aid, record.seq, e
                ))
            })?;

            log.detector.note_accepted(record.seq, record.said);
            log.tracker
                .track_event(record.said, &state.witnesses, state.witness_threshold);
            for receipt in self.store.receipts_for(&record.said).await? {
                if let Err(e) = log.tracker.record(&receipt) {
                    tracing::warn!("Stored receipt for {} rejected on replay: {}", record.said, e);
                }
            }
            log.state = Some(state);
        }

        if self.store.has_duplicity(&aid).await? {
            if let Some(state) = &log.state {
                log.state = Some(state.as_compromised());
            }
        }

        if replayed > 0 {
            tracing::debug!("Replayed {} stored events for {}", replayed, aid);
        }
        log.loaded = true;
        Ok(())
    }

    /// Validate an event against the current state, including the
    /// delegator's approval for delegated kinds.
    async fn validate_next(
        &self,
        current: Option<&KeyState>,
        message: &EventMessage,
    ) -> Result<KeyState> {
        let state = match current {
            None => KeyState::incept(message)?,
            Some(prior) => prior.apply(message)?,
        };
        if message.event.kind.is_delegated() {
            if let Some(delegator) = state.delegator {
                self.check_delegation(&delegator, message.event.aid, message.event.seq, message.said())
                    .await?;
            }
        }
        Ok(state)
    }

    /// A delegated event is approved when the delegator's accepted log
    /// anchors a seal naming it. The delegator must exist, its log must
    /// not be compromised, and it must not carry the do-not-delegate
    /// trait. Condemnation voids the delegator's anchors, including
    /// seals accepted before the duplicity surfaced.
    async fn check_delegation(
        &self,
        delegator: &Aid,
        child: Aid,
        seq: u64,
        said: Said,
    ) -> Result<()> {
        let Some(inception) = self.store.event_at(delegator, 0).await? else {
            return Err(ValidationError::DelegationNotAnchored.into());
        };
        if self.store.has_duplicity(delegator).await? {
            return Err(ValidationError::DelegatorCompromised.into());
        }
        let inception = decode_record(&inception)?;
        if inception.event.config.contains(&ConfigTrait::DoNotDelegate) {
            return Err(ValidationError::DelegationForbidden.into());
        }

        for record in self.store.load_log(delegator).await? {
            let message = decode_record(&record)?;
            let anchored = message
                .event
                .anchors
                .iter()
                .any(|seal| seal.aid == child && seal.seq == seq && seal.said == said);
            if anchored {
                return Ok(());
            }
        }
        Err(ValidationError::DelegationNotAnchored.into())
    }

    /// Persist an accepted event and fold it into the context. Returns
    /// whether the event is already fully witnessed.
    async fn commit_event(
        &self,
        log: &mut AidLog,
        message: &EventMessage,
        state: KeyState,
    ) -> Result<bool> {
        let said = message.said();
        let record = EventRecord {
            aid: state.aid,
            seq: state.seq,
            said,
            kind: message.event.kind,
            canonical: message.encode(),
            accepted_at: now_millis(),
        };

        match self.store.append_event(&record).await? {
            InsertOutcome::Inserted | InsertOutcome::AlreadyExists => {}
            InsertOutcome::Conflict { existing } => {
                // Another writer filled this slot with different history.
                self.condemn(log, state.aid, state.seq, existing, said).await?;
                return Err(KernelError::Duplicity {
                    aid: state.aid,
                    seq: state.seq,
                });
            }
        }

        log.detector.note_accepted(state.seq, said);
        log.tracker
            .track_event(said, &state.witnesses, state.witness_threshold);

        for receipt in log.orphan_receipts.take(&said) {
            match log.tracker.record(&receipt) {
                Ok(ReceiptOutcome::Accepted) => {
                    self.store.add_receipt(&receipt, now_millis()).await?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Escrowed receipt from {:?} dropped at acceptance: {}",
                        receipt.witness,
                        e
                    );
                }
            }
        }

        let fully = log.tracker.fully_witnessed(&said).unwrap_or(false);
        tracing::debug!(
            "Accepted {:?} event for {} at seq {}",
            message.event.kind,
            state.aid,
            state.seq
        );
        log.state = Some(state);
        Ok(fully)
    }

    /// Release buffered events that have become contiguous with the head.
    ///
    /// A buffered event that fails validation on release is dropped and
    /// draining stops, since everything behind it depended on it.
    async fn drain_escrow(&self, log: &mut AidLog) -> Result<()> {
        loop {
            let next = match &log.state {
                Some(state) => state.seq + 1,
                None => return Ok(()),
            };
            let Some(buffered) = log.escrow.take(next) else {
                return Ok(());
            };

            let current = log.state.clone();
            match self.validate_next(current.as_ref(), &buffered).await {
                Ok(state) => {
                    self.commit_event(log, &buffered, state).await?;
                    tracing::debug!("Released escrowed event at seq {}", next);
                }
                Err(e @ (KernelError::Store(_) | KernelError::Corrupt(_))) => return Err(e),
                Err(e) => {
                    tracing::warn!("Escrowed event at seq {} discarded on release: {}", next, e);
                    return Ok(());
                }
            }
        }
    }

    /// Handle an event at an already-filled sequence number.
    async fn check_stale(
        &self,
        log: &mut AidLog,
        state: &KeyState,
        message: &EventMessage,
    ) -> Result<SubmitOutcome> {
        let aid = message.event.aid;
        let seq = message.event.seq;
        let said = message.said();

        match log.detector.check(seq, &said) {
            DuplicityCheck::Match => Ok(SubmitOutcome::Duplicate),
            DuplicityCheck::Divergent { accepted } => {
                // Only a candidate the current keys actually signed
                // condemns the log; anything else is plain garbage at a
                // filled slot.
                match verify_signatures(&said, &message.signatures, &state.keys, &state.threshold) {
                    Verdict::Satisfied => {
                        self.condemn(log, aid, seq, accepted, said).await?;
                        Err(KernelError::Duplicity { aid, seq })
                    }
                    Verdict::Insufficient => Err(ValidationError::InsufficientSignatures.into()),
                    Verdict::Invalid => Err(ValidationError::SignatureFailed.into()),
                }
            }
            DuplicityCheck::Unknown => Err(KernelError::Corrupt(format!(
                "no accepted event at seq {} despite head {}",
                seq, state.seq
            ))),
        }
    }

    /// Record duplicity evidence and mark the log compromised.
    async fn condemn(
        &self,
        log: &mut AidLog,
        aid: Aid,
        seq: u64,
        accepted: Said,
        observed: Said,
    ) -> Result<()> {
        let record = DuplicityRecord {
            aid,
            seq,
            accepted,
            observed,
            detected_at: now_millis(),
        };
        self.store.record_duplicity(&record).await?;
        if let Some(state) = &log.state {
            log.state = Some(state.as_compromised());
        }
        log.escrow.clear();
        tracing::warn!(
            "Duplicity detected for {} at seq {}: accepted={}, observed={}",
            aid,
            seq,
            accepted,
            observed
        );
        Ok(())
    }

    fn buffer_ahead(
        &self,
        log: &mut AidLog,
        message: &EventMessage,
        next_expected: u64,
    ) -> Result<SubmitOutcome> {
        let aid = message.event.aid;
        let seq = message.event.seq;
        match log.escrow.insert(message.clone()) {
            EscrowOutcome::Buffered | EscrowOutcome::AlreadyBuffered => {
                tracing::debug!(
                    "Buffered out-of-order event for {} at seq {} (expecting {})",
                    aid,
                    seq,
                    next_expected
                );
                Ok(SubmitOutcome::Escrowed {
                    ahead_by: seq - next_expected,
                })
            }
            EscrowOutcome::Full => Err(KernelError::OutOfOrderOverflow {
                aid,
                seq,
                limit: self.config.escrow_limit,
            }),
        }
    }

    fn accepted(&self, log: &AidLog, fully_witnessed: bool) -> Result<SubmitOutcome> {
        match &log.state {
            Some(state) => Ok(SubmitOutcome::Accepted {
                state: state.clone(),
                fully_witnessed,
            }),
            None => Err(KernelError::Corrupt(
                "accepted event left no key state".to_string(),
            )),
        }
    }
}

/// Result of submitting a key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Event was accepted into the log.
    Accepted {
        /// Key state after this submission, including any buffered
        /// events released by it.
        state: KeyState,
        /// Whether the submitted event already meets its witness
        /// threshold.
        fully_witnessed: bool,
    },
    /// The exact event is already in the log (idempotent).
    Duplicate,
    /// Event is ahead of the head and was buffered.
    Escrowed {
        /// How many events are still missing before it can apply.
        ahead_by: u64,
    },
}

/// Result of submitting a witness receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptSubmitOutcome {
    /// Receipt was counted.
    Accepted {
        /// Whether the event now meets its witness threshold.
        fully_witnessed: bool,
    },
    /// This witness already receipted the event.
    DuplicateWitness,
    /// The receipted digest is not accepted yet; the receipt is buffered.
    Escrowed,
}

/// Witnessing progress for one accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessStatus {
    /// The witness threshold is met.
    FullyWitnessed,
    /// More receipts are needed.
    UnderWitnessed { have: u32, need: u32 },
}

/// Decode a stored record back into a message.
fn decode_record(record: &EventRecord) -> Result<EventMessage> {
    EventMessage::decode(&record.canonical).map_err(|e| {
        KernelError::Corrupt(format!(
            "stored event {} failed to decode: {}",
            record.said, e
        ))
    })
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
