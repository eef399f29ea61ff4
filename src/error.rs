//! Crate-wide error taxonomy.
//!
//! Every failure surfaces to the immediate caller as a distinguishable
//! variant; nothing is swallowed. The single deliberate exception is
//! compaction's final cleanup delete, which is logged and deferred
//! rather than failing the flush (see `compaction`).

use crate::keys::KeyError;
use crate::store::StoreError;

/// Errors produced by the persistence layer.
#[derive(Debug, Clone)]
pub enum PersistenceError {
    /// Malformed document name, meta name, or key input. Rejected
    /// before any I/O happens.
    Validation(String),
    /// A chunked payload could not be reassembled: a part is missing,
    /// duplicated, out of sequence, or mixed with a whole record.
    Integrity {
        doc: String,
        clock: u32,
        detail: String,
    },
    /// Underlying store failure, propagated unchanged. Retry policy
    /// belongs to the caller.
    Store(StoreError),
    /// Coalescing requested with an unsupported option combination.
    Usage(String),
    /// Operation on a document that has no update records.
    UnknownDocument(String),
    /// The CRDT library rejected an update during seeding or compaction.
    Crdt(String),
    /// A stored value (state vector, metadata) failed to decode.
    Encoding(String),
    /// A coalescing window terminated before delivering its result.
    Shutdown,
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Validation(e) => write!(f, "validation error: {e}"),
            PersistenceError::Integrity { doc, clock, detail } => {
                write!(f, "integrity error in {doc:?} at clock {clock}: {detail}")
            }
            PersistenceError::Store(e) => write!(f, "store error: {e}"),
            PersistenceError::Usage(e) => write!(f, "usage error: {e}"),
            PersistenceError::UnknownDocument(doc) => {
                write!(f, "document {doc:?} has no update records")
            }
            PersistenceError::Crdt(e) => write!(f, "CRDT error: {e}"),
            PersistenceError::Encoding(e) => write!(f, "encoding error: {e}"),
            PersistenceError::Shutdown => {
                write!(f, "coalescing window terminated before completing")
            }
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<StoreError> for PersistenceError {
    fn from(e: StoreError) -> Self {
        PersistenceError::Store(e)
    }
}

impl From<KeyError> for PersistenceError {
    fn from(e: KeyError) -> Self {
        PersistenceError::Validation(e.to_string())
    }
}
