//! Per-document state-vector markers.
//!
//! Each document carries exactly one marker record: the CRDT state
//! vector together with the clock it was taken at, overwritten in place
//! by every compaction. The marker doubles as the document registry —
//! a document exists iff its marker does, which is why the update log
//! seeds one on first write.
//!
//! Value encoding is self-describing: `varint(clock)`, `varint(len)`,
//! then the raw vector bytes.

use std::sync::Arc;

use crate::error::PersistenceError;
use crate::keys::{self, RecordKey};
use crate::store::RecordStore;

/// Store for the single snapshot marker each document carries.
pub struct StateVectorStore {
    store: Arc<RecordStore>,
}

impl StateVectorStore {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Overwrite the document's marker with `{clock, vector}`.
    pub fn write(&self, doc: &str, vector: &[u8], clock: u32) -> Result<(), PersistenceError> {
        let key = RecordKey::state_vector(doc)?;
        let mut value = Vec::with_capacity(vector.len() + 10);
        keys::write_varint(&mut value, u64::from(clock));
        keys::write_varint(&mut value, vector.len() as u64);
        value.extend_from_slice(vector);
        self.store.put(&key, &value)?;
        Ok(())
    }

    /// Read the document's marker; `None` when the document is unknown.
    pub fn read(&self, doc: &str) -> Result<Option<(Vec<u8>, u32)>, PersistenceError> {
        let key = RecordKey::state_vector(doc)?;
        match self.store.get(&key)? {
            Some(value) => decode_marker(doc, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Scan every marker across all documents. This is how the system
    /// discovers which documents exist without a separate registry.
    pub fn enumerate_all(&self) -> Result<Vec<(String, u32)>, PersistenceError> {
        let records = self.store.scan_state_vectors()?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let (_, clock) = decode_marker(&record.key.doc, &record.value)?;
            out.push((record.key.doc, clock));
        }
        Ok(out)
    }
}

fn decode_marker(doc: &str, value: &[u8]) -> Result<(Vec<u8>, u32), PersistenceError> {
    let (clock, rest) = keys::read_varint(value)
        .map_err(|e| PersistenceError::Encoding(format!("marker for {doc:?}: {e}")))?;
    let clock = u32::try_from(clock).map_err(|_| {
        PersistenceError::Encoding(format!("marker for {doc:?}: clock {clock} out of range"))
    })?;
    let (len, rest) = keys::read_varint(rest)
        .map_err(|e| PersistenceError::Encoding(format!("marker for {doc:?}: {e}")))?;
    if rest.len() as u64 != len {
        return Err(PersistenceError::Encoding(format!(
            "marker for {doc:?}: declared vector length {len}, found {}",
            rest.len()
        )));
    }
    Ok((rest.to_vec(), clock))
}
