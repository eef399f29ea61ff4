//! Append-only, clock-indexed update log.
//!
//! Every external write lands here as one logical update at the next
//! clock for its document. The clock is derived, never stored: it is
//! the highest clock among the document's update records, so
//! `current_clock` is a single reverse iterator step.
//!
//! The very first append for a document also seeds the state-vector
//! marker at clock 0, so every document that has ever been written is
//! discoverable through the marker scan before any compaction runs.
//! Seeding is an explicit step (`seed_state_vector`) rather than a side
//! effect buried in the write path.
//!
//! Concurrent appends to the same document are not serialized here; the
//! caller runs one writer per document. Two racing appends can compute
//! the same clock, and the store's upsert lets the later write win.

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, Transact, Update};

use crate::chunks;
use crate::error::PersistenceError;
use crate::keys::{self, RecordKey, RecordKind};
use crate::state_vector::StateVectorStore;
use crate::store::{ReadOptions, RecordStore};

const META_INFO: &str = "info";

/// Housekeeping record kept alongside each document's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last write timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl DocumentMeta {
    fn new() -> Self {
        let now = unix_now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, PersistenceError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| PersistenceError::Encoding(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| PersistenceError::Encoding(e.to_string()))?;
        Ok(meta)
    }
}

/// Append-only update log over the record store.
pub struct UpdateLog {
    store: Arc<RecordStore>,
    vectors: StateVectorStore,
}

impl UpdateLog {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            vectors: StateVectorStore::new(store.clone()),
            store,
        }
    }

    /// Highest clock among the document's update records; `None` when
    /// the document has never been written (distinct from clock 0).
    pub fn current_clock(&self, doc: &str) -> Result<Option<u32>, PersistenceError> {
        keys::validate_doc_name(doc)?;
        let records = self.store.scan_updates(
            doc,
            0,
            keys::MAX_CLOCK,
            &ReadOptions {
                reverse: true,
                limit: Some(1),
            },
        )?;
        match records.first() {
            Some(record) => match record.key.kind {
                RecordKind::Update { clock, .. } => Ok(Some(clock)),
                ref other => Err(PersistenceError::Validation(format!(
                    "unexpected {other:?} record in update range of {doc:?}"
                ))),
            },
            None => Ok(None),
        }
    }

    /// Append one update at the next clock. Seeds the state-vector
    /// marker first when this is the document's very first write.
    pub fn append(&self, doc: &str, update: &[u8]) -> Result<u32, PersistenceError> {
        keys::validate_doc_name(doc)?;
        let current = self.current_clock(doc)?;
        let new_clock = match current {
            Some(clock) => clock + 1,
            None => 0,
        };
        if current.is_none() {
            self.seed_state_vector(doc, update)?;
        }
        chunks::put_chunked(&self.store, doc, new_clock, update)?;
        self.touch_meta(doc)?;
        log::debug!(
            "appended {} bytes to {doc:?} at clock {new_clock}",
            update.len()
        );
        Ok(new_clock)
    }

    /// Materialize the clock-0 state-vector marker from a document's
    /// first update, by folding it into a fresh CRDT document.
    pub fn seed_state_vector(&self, doc: &str, update: &[u8]) -> Result<(), PersistenceError> {
        let decoded = Update::decode_v1(update).map_err(|e| {
            PersistenceError::Crdt(format!("first update for {doc:?} does not decode: {e}"))
        })?;
        let fresh = Doc::new();
        {
            let mut txn = fresh.transact_mut();
            txn.apply_update(decoded).map_err(|e| {
                PersistenceError::Crdt(format!("first update for {doc:?} rejected: {e}"))
            })?;
        }
        let vector = fresh.transact().state_vector().encode_v1();
        self.vectors.write(doc, &vector, 0)?;
        log::debug!("seeded state vector for {doc:?} at clock 0");
        Ok(())
    }

    /// Reassembled update payloads with `from <= clock < to`.
    /// `opts.reverse` yields most-recent-first; `opts.limit` bounds the
    /// number of logical updates, never splitting a chunk run.
    pub fn read_range(
        &self,
        doc: &str,
        from: u32,
        to: u32,
        opts: &ReadOptions,
    ) -> Result<Vec<Vec<u8>>, PersistenceError> {
        keys::validate_doc_name(doc)?;
        let records = self.store.scan_updates(doc, from, to, opts)?;
        let groups = chunks::reassemble(doc, &records)?;
        Ok(groups.into_iter().map(|(_, payload)| payload).collect())
    }

    /// Delete every update record (all parts) with `from <= clock < to`.
    /// Compaction-only; returns the number of physical records removed.
    pub fn clear_range(&self, doc: &str, from: u32, to: u32) -> Result<u64, PersistenceError> {
        keys::validate_doc_name(doc)?;
        Ok(self.store.delete_update_range(doc, from, to)?)
    }

    /// The document's housekeeping record, if any write ever landed.
    pub fn document_meta(&self, doc: &str) -> Result<Option<DocumentMeta>, PersistenceError> {
        let key = RecordKey::meta(doc, META_INFO)?;
        match self.store.get(&key)? {
            Some(bytes) => DocumentMeta::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn touch_meta(&self, doc: &str) -> Result<(), PersistenceError> {
        let key = RecordKey::meta(doc, META_INFO)?;
        let mut meta = match self.store.get(&key)? {
            Some(bytes) => DocumentMeta::decode(&bytes)?,
            None => DocumentMeta::new(),
        };
        meta.updated_at = unix_now();
        self.store.put(&key, &meta.encode()?)?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
