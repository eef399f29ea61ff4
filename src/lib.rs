//! # yrocks — clock-sequenced RocksDB persistence for Yjs documents
//!
//! Persists the append-only update log of [yrs](https://docs.rs/yrs)
//! CRDT documents into RocksDB and reconstructs or compacts it on
//! demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     DocPersistence                       │
//! │                                                          │
//! │  UpdateLog ──► ChunkedBlobStore ──► RecordStore (RocksDB)│
//! │      │                                   ▲               │
//! │  Compactor ──► StateVectorStore ─────────┤               │
//! │                                          │               │
//! │  ReadCoalescer ──── merged multi-doc ────┘               │
//! │                     query + demux                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each document's log is a clock-indexed sequence of binary updates
//! under order-preserving composite keys, so range reads and compaction
//! deletes are plain iterator scans. Payloads over the store's
//! per-record ceiling are chunked into part-numbered records and
//! reassembled losslessly on read. Compaction folds the log into one
//! baseline update plus a state-vector marker with append-then-clear
//! ordering, so a crash mid-flush never loses a readable document.
//!
//! ## Modules
//!
//! - [`keys`] — canonical order-preserving record keys + varint codec
//! - [`store`] — RocksDB adapter: column families, scans, range deletes
//! - [`chunks`] — split/reassemble payloads over the record ceiling
//! - [`update_log`] — append-only clock-indexed update log
//! - [`state_vector`] — per-document snapshot markers + enumeration
//! - [`compaction`] — fold the log into a baseline, discard history
//! - [`coalescer`] — batch concurrent reads into one merged query
//! - [`persistence`] — the facade bundling all of the above

pub mod chunks;
pub mod coalescer;
pub mod compaction;
pub mod error;
pub mod keys;
pub mod persistence;
pub mod state_vector;
pub mod store;
pub mod update_log;

// Re-exports for convenience
pub use coalescer::{CoalescerConfig, LogQuery, QueryKind, ReadCoalescer};
pub use compaction::Compactor;
pub use error::PersistenceError;
pub use keys::{KeyError, RecordKey, RecordKind};
pub use persistence::DocPersistence;
pub use state_vector::StateVectorStore;
pub use store::{
    CollectionMode, RawRecord, ReadOptions, RecordStore, StoreConfig, StoreError, StoreStats,
};
pub use update_log::{DocumentMeta, UpdateLog};
