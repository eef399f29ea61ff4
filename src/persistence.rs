//! The persistence facade exposed to the provider layer above.
//!
//! One handle bundling the update log, the state-vector store, and the
//! compactor over a shared record store. Everything callers need for a
//! document's lifecycle goes through here: store updates, read them
//! back, compact, reconstruct a live CRDT document, enumerate and
//! delete documents, drop the database.

use std::sync::Arc;

use yrs::Doc;

use crate::coalescer::{CoalescerConfig, ReadCoalescer};
use crate::compaction::{self, Compactor};
use crate::error::PersistenceError;
use crate::keys;
use crate::state_vector::StateVectorStore;
use crate::store::{ReadOptions, RecordStore, StoreConfig};
use crate::update_log::{DocumentMeta, UpdateLog};

/// Document persistence over a shared record store.
pub struct DocPersistence {
    store: Arc<RecordStore>,
    log: UpdateLog,
    vectors: StateVectorStore,
    compactor: Compactor,
}

impl DocPersistence {
    /// Open (or create) the database at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self, PersistenceError> {
        let store = Arc::new(RecordStore::open(config)?);
        Ok(Self::with_store(store))
    }

    /// Build the facade over an already-open store.
    pub fn with_store(store: Arc<RecordStore>) -> Self {
        Self {
            log: UpdateLog::new(store.clone()),
            vectors: StateVectorStore::new(store.clone()),
            compactor: Compactor::new(store.clone()),
            store,
        }
    }

    /// The shared record store, e.g. for statistics.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// A read coalescer over the same store.
    pub fn coalescer(&self, config: CoalescerConfig) -> ReadCoalescer {
        ReadCoalescer::new(self.store.clone(), config)
    }

    /// Every update payload in the document's log, in clock order.
    pub fn get_updates(&self, doc: &str) -> Result<Vec<Vec<u8>>, PersistenceError> {
        self.log
            .read_range(doc, 0, keys::MAX_CLOCK, &ReadOptions::default())
    }

    /// A clock range of the document's log, with read options.
    pub fn get_updates_range(
        &self,
        doc: &str,
        from: u32,
        to: u32,
        opts: &ReadOptions,
    ) -> Result<Vec<Vec<u8>>, PersistenceError> {
        self.log.read_range(doc, from, to, opts)
    }

    /// The document's current clock; `None` when never written.
    pub fn get_current_clock(&self, doc: &str) -> Result<Option<u32>, PersistenceError> {
        self.log.current_clock(doc)
    }

    /// Append one update, returning the clock it was stored at.
    pub fn store_update(&self, doc: &str, update: &[u8]) -> Result<u32, PersistenceError> {
        self.log.append(doc, update)
    }

    /// Overwrite the document's state-vector marker.
    pub fn write_state_vector(
        &self,
        doc: &str,
        vector: &[u8],
        clock: u32,
    ) -> Result<(), PersistenceError> {
        self.vectors.write(doc, vector, clock)
    }

    /// The document's state-vector marker; `None` when unknown.
    pub fn read_state_vector(&self, doc: &str) -> Result<Option<(Vec<u8>, u32)>, PersistenceError> {
        self.vectors.read(doc)
    }

    /// Persist an externally derived baseline and discard the subsumed
    /// log. Returns the baseline's clock.
    pub fn flush_document(
        &self,
        doc: &str,
        baseline: &[u8],
        vector: &[u8],
    ) -> Result<u32, PersistenceError> {
        self.compactor.flush_with(doc, baseline, vector)
    }

    /// Fold the full log into a baseline via the CRDT library and
    /// persist it. Returns the baseline's clock.
    pub fn compact(&self, doc: &str) -> Result<u32, PersistenceError> {
        self.compactor.flush(doc)
    }

    /// Names of every document the store knows, discovered through the
    /// state-vector markers.
    pub fn list_all_document_names(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .vectors
            .enumerate_all()?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    /// Reconstruct the live CRDT document by replaying its log.
    pub fn get_document(&self, doc: &str) -> Result<Doc, PersistenceError> {
        let payloads = self.get_updates(doc)?;
        if payloads.is_empty() {
            return Err(PersistenceError::UnknownDocument(doc.to_string()));
        }
        compaction::fold_into_doc(doc, payloads.iter().map(Vec::as_slice))
    }

    /// Delete every record of one document, all kinds. Returns the
    /// number of physical records removed.
    pub fn clear_document(&self, doc: &str) -> Result<u64, PersistenceError> {
        keys::validate_doc_name(doc)?;
        let removed = self.store.delete_document(doc)?;
        log::info!("cleared document {doc:?} ({removed} records)");
        Ok(removed)
    }

    /// The document's housekeeping record.
    pub fn document_meta(&self, doc: &str) -> Result<Option<DocumentMeta>, PersistenceError> {
        self.log.document_meta(doc)
    }

    /// Drop the entire database from disk. Fails if other handles still
    /// share the record store.
    pub fn destroy(self) -> Result<(), PersistenceError> {
        let DocPersistence {
            store,
            log,
            vectors,
            compactor,
        } = self;
        drop((log, vectors, compactor));
        match Arc::try_unwrap(store) {
            Ok(store) => {
                store.destroy()?;
                Ok(())
            }
            Err(_) => Err(PersistenceError::Usage(
                "cannot destroy: record store is still shared".into(),
            )),
        }
    }
}
