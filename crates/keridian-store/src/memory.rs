//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use keridian_core::{Aid, Receipt, Said};

use crate::error::Result;
use crate::traits::{DuplicityRecord, EventRecord, InsertOutcome, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Events indexed by digest.
    events: HashMap<Said, EventRecord>,

    /// Position index: (aid, seq) -> said. Ordered so log reads and
    /// identifier listings come out sorted.
    positions: BTreeMap<(Aid, u64), Said>,

    /// Receipts per event digest, one slot per witness.
    receipts: HashMap<Said, Vec<Receipt>>,

    /// Duplicity evidence per identifier.
    duplicity: HashMap<Aid, Vec<DuplicityRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                events: HashMap::new(),
                positions: BTreeMap::new(),
                receipts: HashMap::new(),
                duplicity: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_event(&self, record: &EventRecord) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().unwrap();

        if inner.events.contains_key(&record.said) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        if let Some(&existing) = inner.positions.get(&(record.aid, record.seq)) {
            return Ok(InsertOutcome::Conflict { existing });
        }

        inner.events.insert(record.said, record.clone());
        inner.positions.insert((record.aid, record.seq), record.said);

        Ok(InsertOutcome::Inserted)
    }

    async fn event_at(&self, aid: &Aid, seq: u64) -> Result<Option<EventRecord>> {
        let inner = self.inner.read().unwrap();

        if let Some(said) = inner.positions.get(&(*aid, seq)) {
            Ok(inner.events.get(said).cloned())
        } else {
            Ok(None)
        }
    }

    async fn event_by_said(&self, said: &Said) -> Result<Option<EventRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.events.get(said).cloned())
    }

    async fn head(&self, aid: &Aid) -> Result<Option<u64>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .positions
            .range((*aid, 0)..=(*aid, u64::MAX))
            .next_back()
            .map(|((_, seq), _)| *seq))
    }

    async fn load_log(&self, aid: &Aid) -> Result<Vec<EventRecord>> {
        let inner = self.inner.read().unwrap();

        let mut log = Vec::new();
        for (_, said) in inner.positions.range((*aid, 0)..=(*aid, u64::MAX)) {
            if let Some(record) = inner.events.get(said) {
                log.push(record.clone());
            }
        }

        Ok(log)
    }

    async fn has_event(&self, said: &Said) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.events.contains_key(said))
    }

    async fn list_aids(&self) -> Result<Vec<Aid>> {
        let inner = self.inner.read().unwrap();

        let mut aids: Vec<Aid> = Vec::new();
        for (aid, _) in inner.positions.keys() {
            if aids.last() != Some(aid) {
                aids.push(*aid);
            }
        }

        Ok(aids)
    }

    async fn add_receipt(&self, receipt: &Receipt, _received_at: i64) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let bucket = inner.receipts.entry(receipt.said).or_default();

        match bucket.iter_mut().find(|r| r.witness == receipt.witness) {
            Some(existing) => {
                *existing = receipt.clone();
                Ok(false)
            }
            None => {
                bucket.push(receipt.clone());
                Ok(true)
            }
        }
    }

    async fn receipts_for(&self, said: &Said) -> Result<Vec<Receipt>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.receipts.get(said).cloned().unwrap_or_default())
    }

    async fn receipt_count(&self, said: &Said) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.receipts.get(said).map(|b| b.len() as u64).unwrap_or(0))
    }

    async fn record_duplicity(&self, record: &DuplicityRecord) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let records = inner.duplicity.entry(record.aid).or_default();

        // Idempotent per (seq, observed)
        if !records
            .iter()
            .any(|r| r.seq == record.seq && r.observed == record.observed)
        {
            records.push(record.clone());
            records.sort_by_key(|r| r.seq);
        }

        Ok(())
    }

    async fn duplicity_records(&self, aid: &Aid) -> Result<Vec<DuplicityRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.duplicity.get(aid).cloned().unwrap_or_default())
    }

    async fn has_duplicity(&self, aid: &Aid) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.duplicity.get(aid).map(|r| !r.is_empty()).unwrap_or(false))
    }
}
