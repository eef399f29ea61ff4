//! Log compaction: fold a document's update log into one baseline.
//!
//! `flush` replays the full log into a fresh CRDT document, derives the
//! minimal full-state update and the current state vector, and hands
//! both to `flush_with`, which performs the persisted swap:
//!
//! ```text
//! append baseline @ new clock ──► write marker @ new clock ──► clear [0, new clock)
//! ```
//!
//! The ordering is the durability invariant. The baseline is a brand
//! new log entry, never an in-place overwrite, so a crash anywhere in
//! the sequence leaves the log readable: before the append the old
//! records stand, after it the old records plus the baseline merge to
//! the same state. Only the final clear is allowed to fail without
//! failing the flush — stale subsumed records are redundant, not wrong,
//! and a later flush removes them.
//!
//! Compaction for one document must not run concurrently with itself;
//! callers serialize per document.

use std::sync::Arc;

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::error::PersistenceError;
use crate::keys;
use crate::state_vector::StateVectorStore;
use crate::store::{ReadOptions, RecordStore};
use crate::update_log::UpdateLog;

/// Merges a document's log into a single baseline update plus a fresh
/// state-vector marker, then discards the subsumed history.
pub struct Compactor {
    log: UpdateLog,
    vectors: StateVectorStore,
}

impl Compactor {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            log: UpdateLog::new(store.clone()),
            vectors: StateVectorStore::new(store),
        }
    }

    /// Compact the document's full log. Returns the baseline's clock.
    pub fn flush(&self, doc: &str) -> Result<u32, PersistenceError> {
        keys::validate_doc_name(doc)?;
        let payloads = self
            .log
            .read_range(doc, 0, keys::MAX_CLOCK, &ReadOptions::default())?;
        if payloads.is_empty() {
            return Err(PersistenceError::UnknownDocument(doc.to_string()));
        }

        let folded = fold_into_doc(doc, payloads.iter().map(Vec::as_slice))?;
        let (baseline, vector) = {
            let txn = folded.transact();
            (
                txn.encode_state_as_update_v1(&StateVector::default()),
                txn.state_vector().encode_v1(),
            )
        };
        self.flush_with(doc, &baseline, &vector)
    }

    /// Persist an externally derived baseline: append it at the next
    /// clock, advance the marker, then clear the subsumed range. The
    /// final clear is the only non-fatal step.
    pub fn flush_with(
        &self,
        doc: &str,
        baseline: &[u8],
        vector: &[u8],
    ) -> Result<u32, PersistenceError> {
        let new_clock = self.log.append(doc, baseline)?;
        self.vectors.write(doc, vector, new_clock)?;
        match self.log.clear_range(doc, 0, new_clock) {
            Ok(removed) => {
                log::info!(
                    "compacted {doc:?} into baseline at clock {new_clock}, removed {removed} records"
                );
            }
            Err(e) => {
                log::warn!(
                    "compaction cleanup for {doc:?} failed, subsumed records below clock {new_clock} remain: {e}"
                );
            }
        }
        Ok(new_clock)
    }
}

/// Fold update payloads into a fresh document inside one transaction,
/// in input order.
pub(crate) fn fold_into_doc<'a>(
    doc_name: &str,
    payloads: impl Iterator<Item = &'a [u8]>,
) -> Result<Doc, PersistenceError> {
    let doc = Doc::new();
    {
        let mut txn = doc.transact_mut();
        for payload in payloads {
            let update = Update::decode_v1(payload).map_err(|e| {
                PersistenceError::Crdt(format!("undecodable update in {doc_name:?}: {e}"))
            })?;
            txn.apply_update(update).map_err(|e| {
                PersistenceError::Crdt(format!("update rejected while folding {doc_name:?}: {e}"))
            })?;
        }
    }
    Ok(doc)
}
