//! RocksDB-backed record store.
//!
//! Column-family layout:
//!
//! ```text
//! CollectionMode::Single            CollectionMode::PerDocument
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │ CF "updates"             │      │ CF "doc:<name>"          │
//! │ CF "state_vectors"       │      │   (all kinds, one CF     │
//! │ CF "meta"                │      │    per document, created │
//! └──────────────────────────┘      │    on demand)            │
//!                                   └──────────────────────────┘
//! ```
//!
//! Keys are the canonical composite keys from [`crate::keys`]; values
//! are raw payload bytes. Range reads are iterator scans over the
//! encoded key bounds, so clock order falls out of byte order.
//!
//! The store is shared behind `Arc` and safe for concurrent use; the
//! only interior state besides RocksDB itself is the known-column-family
//! set and the lock-free statistics counters.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rocksdb::{
    BlockBasedOptions, BoundColumnFamily, Cache, ColumnFamilyDescriptor, DBCompressionType,
    DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch, WriteOptions,
};

use crate::keys::{self, KeyError, RecordKey, RecordKind};

type Db = DBWithThreadMode<MultiThreaded>;

const CF_UPDATES: &str = "updates";
const CF_STATE_VECTORS: &str = "state_vectors";
const CF_META: &str = "meta";
const DOC_CF_PREFIX: &str = "doc:";

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 64MB)
    pub write_buffer_size: usize,
    /// Per-record payload ceiling; larger payloads are chunked.
    /// Default 15,000,000 bytes, leaving headroom under a 16 MiB
    /// record cap.
    pub max_record_size: usize,
    /// How documents map onto column families.
    pub collection_mode: CollectionMode,
}

/// Whether all documents share the kind column families or each
/// document gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionMode {
    #[default]
    Single,
    PerDocument,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("yrocks_data"),
            block_cache_size: 256 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024,
            max_record_size: 15_000_000,
            collection_mode: CollectionMode::Single,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
            max_record_size: 15_000_000,
            collection_mode: CollectionMode::Single,
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    Database(String),
    /// A stored key or value failed to decode
    Corrupt(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::Corrupt(e) => write!(f, "corrupt record: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<KeyError> for StoreError {
    fn from(e: KeyError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// A physical record as read from the store.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub key: RecordKey,
    pub value: Vec<u8>,
}

/// Options for ordered update scans.
///
/// `limit` bounds the number of *logical* updates returned: the scan
/// stops at a clock boundary, never in the middle of a chunk run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub reverse: bool,
    pub limit: Option<usize>,
}

/// Lock-free store counters; read via `RecordStore::stats`.
#[derive(Debug, Default)]
struct StoreCounters {
    queries: AtomicU64,
    merged_queries: AtomicU64,
    records_written: AtomicU64,
    records_deleted: AtomicU64,
}

/// Snapshot of store statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub queries: u64,
    pub merged_queries: u64,
    pub records_written: u64,
    pub records_deleted: u64,
}

#[derive(Clone, Copy)]
enum Kind {
    Update,
    StateVector,
    Meta,
}

fn kind_of(kind: &RecordKind) -> Kind {
    match kind {
        RecordKind::Update { .. } => Kind::Update,
        RecordKind::StateVector => Kind::StateVector,
        RecordKind::Meta { .. } => Kind::Meta,
    }
}

/// RocksDB-backed record store for update fragments, state vectors and
/// document metadata.
pub struct RecordStore {
    db: Db,
    config: StoreConfig,
    counters: StoreCounters,
    /// Documents with a dedicated column family (PerDocument mode only).
    doc_cfs: RwLock<HashSet<String>>,
}

impl RecordStore {
    /// Open the store at the configured path, creating the database and
    /// column families as needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        // RocksDB refuses to open unless every existing column family
        // is listed, so union what is on disk with what we need.
        let existing = Db::list_cf(&db_opts, &config.path).unwrap_or_default();
        let mut names: BTreeSet<String> = existing.into_iter().collect();
        names.insert("default".to_string());
        if config.collection_mode == CollectionMode::Single {
            for name in [CF_UPDATES, CF_STATE_VECTORS, CF_META] {
                names.insert(name.to_string());
            }
        }

        let descriptors: Vec<ColumnFamilyDescriptor> = names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Self::cf_options(&config)))
            .collect();

        let db = Db::open_cf_descriptors(&db_opts, &config.path, descriptors)?;

        let doc_cfs = names
            .iter()
            .filter_map(|name| name.strip_prefix(DOC_CF_PREFIX))
            .map(str::to_string)
            .collect();

        log::info!("record store opened at {:?}", config.path);

        Ok(Self {
            db,
            config,
            counters: StoreCounters::default(),
            doc_cfs: RwLock::new(doc_cfs),
        })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();
        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Snapshot of the store counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            queries: self.counters.queries.load(Ordering::Relaxed),
            merged_queries: self.counters.merged_queries.load(Ordering::Relaxed),
            records_written: self.counters.records_written.load(Ordering::Relaxed),
            records_deleted: self.counters.records_deleted.load(Ordering::Relaxed),
        }
    }

    // ─── Point operations ─────────────────────────────────────────────

    /// Upsert one record.
    pub fn put(&self, key: &RecordKey, value: &[u8]) -> Result<(), StoreError> {
        let cf = self.write_cf(&key.doc, kind_of(&key.kind))?;
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        self.db.put_cf_opt(&cf, key.encode(), value, &opts)?;
        self.counters.records_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Upsert a group of records in one atomic batch. The call succeeds
    /// only once every record is durably written.
    pub fn put_many(&self, items: &[(RecordKey, &[u8])]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            let cf = self.write_cf(&key.doc, kind_of(&key.kind))?;
            batch.put_cf(&cf, key.encode(), value);
        }
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &opts)?;
        self.counters
            .records_written
            .fetch_add(items.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Read one record.
    pub fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        let cf = match self.read_cf(&key.doc, kind_of(&key.kind))? {
            Some(cf) => cf,
            None => return Ok(None),
        };
        Ok(self.db.get_cf(&cf, key.encode())?)
    }

    /// Delete one record.
    pub fn delete(&self, key: &RecordKey) -> Result<(), StoreError> {
        let cf = match self.read_cf(&key.doc, kind_of(&key.kind))? {
            Some(cf) => cf,
            None => return Ok(()),
        };
        self.db.delete_cf(&cf, key.encode())?;
        self.counters.records_deleted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // ─── Update scans ─────────────────────────────────────────────────

    /// Scan a document's update records with `from <= clock < to`,
    /// ordered by `(clock, part)` — descending clocks when
    /// `opts.reverse`. `opts.limit` bounds complete clock groups.
    pub fn scan_updates(
        &self,
        doc: &str,
        from: u32,
        to: u32,
        opts: &ReadOptions,
    ) -> Result<Vec<RawRecord>, StoreError> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.scan_updates_in(doc, from, to, opts)
    }

    /// One merged query over several documents' full update logs, in
    /// input document order. Counted once in the statistics regardless
    /// of how many documents it covers.
    pub fn scan_updates_multi(&self, docs: &[String]) -> Result<Vec<RawRecord>, StoreError> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.counters.merged_queries.fetch_add(1, Ordering::Relaxed);
        let mut out = Vec::new();
        for doc in docs {
            out.extend(self.scan_updates_in(doc, 0, keys::MAX_CLOCK, &ReadOptions::default())?);
        }
        Ok(out)
    }

    fn scan_updates_in(
        &self,
        doc: &str,
        from: u32,
        to: u32,
        opts: &ReadOptions,
    ) -> Result<Vec<RawRecord>, StoreError> {
        if opts.limit == Some(0) {
            return Ok(Vec::new());
        }
        let (start, end) = keys::update_range(doc, from, to)?;
        let cf = match self.read_cf(doc, Kind::Update)? {
            Some(cf) => cf,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        let mut current_clock: Option<u32> = None;
        let mut groups_done = 0usize;

        let mode = if opts.reverse {
            IteratorMode::From(&end, Direction::Reverse)
        } else {
            IteratorMode::From(&start, Direction::Forward)
        };

        for item in self.db.iterator_cf(&cf, mode) {
            let (raw_key, value) = item?;
            if opts.reverse {
                // Reverse positioning lands at the last key <= end;
                // the end bound itself is exclusive.
                if raw_key.as_ref() >= end.as_slice() {
                    continue;
                }
                if raw_key.as_ref() < start.as_slice() {
                    break;
                }
            } else if raw_key.as_ref() >= end.as_slice() {
                break;
            }

            let key = RecordKey::decode(&raw_key)?;
            let clock = match key.kind {
                RecordKind::Update { clock, .. } => clock,
                ref other => {
                    return Err(StoreError::Corrupt(format!(
                        "non-update record {other:?} inside update range of {doc:?}"
                    )))
                }
            };

            if let Some(limit) = opts.limit {
                if let Some(current) = current_clock {
                    if current != clock {
                        groups_done += 1;
                        if groups_done >= limit {
                            break;
                        }
                    }
                }
            }
            current_clock = Some(clock);
            out.push(RawRecord {
                key,
                value: value.into_vec(),
            });
        }

        Ok(out)
    }

    // ─── Range deletes ────────────────────────────────────────────────

    /// Delete every update record (all parts) with `from <= clock < to`.
    /// Returns the number of physical records removed.
    pub fn delete_update_range(&self, doc: &str, from: u32, to: u32) -> Result<u64, StoreError> {
        let (start, end) = keys::update_range(doc, from, to)?;
        let cf = match self.read_cf(doc, Kind::Update)? {
            Some(cf) => cf,
            None => return Ok(0),
        };
        let mut batch = WriteBatch::default();
        let mut count = 0u64;
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward))
        {
            let (raw_key, _) = item?;
            if raw_key.as_ref() >= end.as_slice() {
                break;
            }
            batch.delete_cf(&cf, &raw_key);
            count += 1;
        }
        if count > 0 {
            self.db.write(batch)?;
            self.counters
                .records_deleted
                .fetch_add(count, Ordering::Relaxed);
        }
        Ok(count)
    }

    /// Delete every record of one document, all kinds. Returns the
    /// number of physical records removed.
    pub fn delete_document(&self, doc: &str) -> Result<u64, StoreError> {
        let (start, end) = keys::doc_range(doc)?;
        let cfs: Vec<Arc<BoundColumnFamily<'_>>> = match self.config.collection_mode {
            CollectionMode::Single => vec![
                self.kind_cf(CF_UPDATES)?,
                self.kind_cf(CF_STATE_VECTORS)?,
                self.kind_cf(CF_META)?,
            ],
            CollectionMode::PerDocument => match self.read_cf(doc, Kind::Update)? {
                Some(cf) => vec![cf],
                None => return Ok(0),
            },
        };

        let mut batch = WriteBatch::default();
        let mut count = 0u64;
        for cf in &cfs {
            for item in self
                .db
                .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward))
            {
                let (raw_key, _) = item?;
                if raw_key.as_ref() >= end.as_slice() {
                    break;
                }
                batch.delete_cf(cf, &raw_key);
                count += 1;
            }
        }
        if count > 0 {
            self.db.write(batch)?;
            self.counters
                .records_deleted
                .fetch_add(count, Ordering::Relaxed);
        }
        Ok(count)
    }

    // ─── State-vector enumeration ─────────────────────────────────────

    /// Every state-vector record across all documents.
    pub fn scan_state_vectors(&self) -> Result<Vec<RawRecord>, StoreError> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        let mut out = Vec::new();
        match self.config.collection_mode {
            CollectionMode::Single => {
                let cf = self.kind_cf(CF_STATE_VECTORS)?;
                for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
                    let (raw_key, value) = item?;
                    let key = RecordKey::decode(&raw_key)?;
                    if matches!(key.kind, RecordKind::StateVector) {
                        out.push(RawRecord {
                            key,
                            value: value.into_vec(),
                        });
                    }
                }
            }
            CollectionMode::PerDocument => {
                let mut docs: Vec<String> = self.doc_cf_set().iter().cloned().collect();
                docs.sort();
                for doc in docs {
                    let key = RecordKey::state_vector(&doc)?;
                    if let Some(cf) = self.read_cf(&doc, Kind::StateVector)? {
                        if let Some(value) = self.db.get_cf(&cf, key.encode())? {
                            out.push(RawRecord { key, value });
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Drop the entire database from disk. Consumes the store; fails if
    /// other handles still share it.
    pub fn destroy(self) -> Result<(), StoreError> {
        let RecordStore { db, config, .. } = self;
        drop(db);
        rocksdb::DB::destroy(&Options::default(), &config.path)?;
        log::info!("record store destroyed at {:?}", config.path);
        Ok(())
    }

    // ─── Column-family plumbing ───────────────────────────────────────

    fn cf_name(&self, doc: &str, kind: Kind) -> String {
        match self.config.collection_mode {
            CollectionMode::PerDocument => format!("{DOC_CF_PREFIX}{doc}"),
            CollectionMode::Single => match kind {
                Kind::Update => CF_UPDATES.to_string(),
                Kind::StateVector => CF_STATE_VECTORS.to_string(),
                Kind::Meta => CF_META.to_string(),
            },
        }
    }

    fn kind_cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family {name:?} missing")))
    }

    /// Column family for reads; `None` when a PerDocument-mode document
    /// was never written.
    fn read_cf(&self, doc: &str, kind: Kind) -> Result<Option<Arc<BoundColumnFamily<'_>>>, StoreError> {
        let name = self.cf_name(doc, kind);
        match self.db.cf_handle(&name) {
            Some(cf) => Ok(Some(cf)),
            None => match self.config.collection_mode {
                CollectionMode::PerDocument => Ok(None),
                CollectionMode::Single => Err(StoreError::Database(format!(
                    "column family {name:?} missing"
                ))),
            },
        }
    }

    /// Column family for writes; created on demand in PerDocument mode.
    fn write_cf(&self, doc: &str, kind: Kind) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        let name = self.cf_name(doc, kind);
        if self.config.collection_mode == CollectionMode::PerDocument {
            let mut known = self.doc_cf_set_mut();
            if !known.contains(doc) {
                self.db.create_cf(&name, &Self::cf_options(&self.config))?;
                known.insert(doc.to_string());
                log::debug!("created column family {name:?}");
            }
        }
        self.kind_cf(&name)
    }

    fn doc_cf_set(&self) -> RwLockReadGuard<'_, HashSet<String>> {
        self.doc_cfs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn doc_cf_set_mut(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        self.doc_cfs.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> RecordStore {
        RecordStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap()
    }

    fn update(doc: &str, clock: u32, part: u32) -> RecordKey {
        RecordKey::update(doc, clock, part).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let key = update("d", 0, 0);
        assert!(store.get(&key).unwrap().is_none());
        store.put(&key, b"payload").unwrap();
        assert_eq!(store.get(&key).unwrap().unwrap(), b"payload");
    }

    #[test]
    fn test_scan_orders_by_clock_and_part() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        // Insert out of order on purpose.
        store.put(&update("d", 1, 2), b"c1p2").unwrap();
        store.put(&update("d", 0, 0), b"c0").unwrap();
        store.put(&update("d", 1, 1), b"c1p1").unwrap();
        store.put(&update("d", 2, 0), b"c2").unwrap();

        let records = store
            .scan_updates("d", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap();
        let values: Vec<&[u8]> = records.iter().map(|r| r.value.as_slice()).collect();
        assert_eq!(values, vec![&b"c0"[..], b"c1p1", b"c1p2", b"c2"]);

        let reversed = store
            .scan_updates(
                "d",
                0,
                keys::MAX_CLOCK,
                &ReadOptions {
                    reverse: true,
                    limit: None,
                },
            )
            .unwrap();
        let values: Vec<&[u8]> = reversed.iter().map(|r| r.value.as_slice()).collect();
        assert_eq!(values, vec![&b"c2"[..], b"c1p2", b"c1p1", b"c0"]);
    }

    #[test]
    fn test_scan_range_bounds_are_half_open() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        for clock in 0..5 {
            store
                .put(&update("d", clock, 0), format!("c{clock}").as_bytes())
                .unwrap();
        }
        let records = store.scan_updates("d", 1, 4, &ReadOptions::default()).unwrap();
        let clocks: Vec<u32> = records
            .iter()
            .map(|r| match r.key.kind {
                RecordKind::Update { clock, .. } => clock,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(clocks, vec![1, 2, 3]);
    }

    #[test]
    fn test_scan_limit_counts_clock_groups() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.put(&update("d", 0, 0), b"c0").unwrap();
        // Clock 1 is a three-part chunk run.
        store.put(&update("d", 1, 1), b"a").unwrap();
        store.put(&update("d", 1, 2), b"b").unwrap();
        store.put(&update("d", 1, 3), b"c").unwrap();
        store.put(&update("d", 2, 0), b"c2").unwrap();

        // Most recent 1 logical update = clock 2 only.
        let latest = store
            .scan_updates(
                "d",
                0,
                keys::MAX_CLOCK,
                &ReadOptions {
                    reverse: true,
                    limit: Some(1),
                },
            )
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].value, b"c2");

        // Most recent 2 must include the whole chunk run of clock 1.
        let latest2 = store
            .scan_updates(
                "d",
                0,
                keys::MAX_CLOCK,
                &ReadOptions {
                    reverse: true,
                    limit: Some(2),
                },
            )
            .unwrap();
        assert_eq!(latest2.len(), 4);

        // Forward limit 2 = clocks 0 and 1 complete.
        let first2 = store
            .scan_updates(
                "d",
                0,
                keys::MAX_CLOCK,
                &ReadOptions {
                    reverse: false,
                    limit: Some(2),
                },
            )
            .unwrap();
        assert_eq!(first2.len(), 4);
    }

    #[test]
    fn test_scan_does_not_leak_across_documents() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.put(&update("doc", 0, 0), b"mine").unwrap();
        store.put(&update("doc2", 0, 0), b"other").unwrap();

        let records = store
            .scan_updates("doc", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, b"mine");
    }

    #[test]
    fn test_delete_update_range() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        for clock in 0..10 {
            store.put(&update("d", clock, 0), b"x").unwrap();
        }
        let removed = store.delete_update_range("d", 0, 7).unwrap();
        assert_eq!(removed, 7);
        let left = store
            .scan_updates("d", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap();
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn test_put_many_is_atomic_batch() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let k1 = update("d", 3, 1);
        let k2 = update("d", 3, 2);
        store
            .put_many(&[(k1.clone(), b"aa".as_slice()), (k2.clone(), b"bb".as_slice())])
            .unwrap();
        assert_eq!(store.get(&k1).unwrap().unwrap(), b"aa");
        assert_eq!(store.get(&k2).unwrap().unwrap(), b"bb");
        assert_eq!(store.stats().records_written, 2);
    }

    #[test]
    fn test_multi_scan_counts_one_merged_query() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.put(&update("a", 0, 0), b"ua").unwrap();
        store.put(&update("b", 0, 0), b"ub").unwrap();
        store.put(&update("b", 1, 0), b"ub1").unwrap();

        let records = store
            .scan_updates_multi(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(records.len(), 3);

        let stats = store.stats();
        assert_eq!(stats.merged_queries, 1);
        assert_eq!(stats.queries, 1);
    }

    #[test]
    fn test_state_vector_scan_across_documents() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        for doc in ["a", "b", "c"] {
            store
                .put(&RecordKey::state_vector(doc).unwrap(), doc.as_bytes())
                .unwrap();
        }
        store.put(&update("a", 0, 0), b"noise").unwrap();

        let records = store.scan_state_vectors().unwrap();
        let docs: Vec<&str> = records.iter().map(|r| r.key.doc.as_str()).collect();
        assert_eq!(docs, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delete_document_removes_all_kinds() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.put(&update("d", 0, 0), b"u").unwrap();
        store.put(&update("d", 1, 0), b"u1").unwrap();
        store
            .put(&RecordKey::state_vector("d").unwrap(), b"sv")
            .unwrap();
        store
            .put(&RecordKey::meta("d", "info").unwrap(), b"m")
            .unwrap();
        store.put(&update("other", 0, 0), b"keep").unwrap();

        let removed = store.delete_document("d").unwrap();
        assert_eq!(removed, 4);
        assert!(store
            .scan_updates("d", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap()
            .is_empty());
        assert!(store
            .get(&RecordKey::state_vector("d").unwrap())
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .scan_updates("other", 0, keys::MAX_CLOCK, &ReadOptions::default())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_per_document_mode_isolates_and_enumerates() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            collection_mode: CollectionMode::PerDocument,
            ..StoreConfig::for_testing(dir.path().join("db"))
        };
        let store = RecordStore::open(config).unwrap();

        // Reads before any write see an absent column family.
        assert!(store
            .scan_updates("a", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap()
            .is_empty());

        store.put(&update("a", 0, 0), b"ua").unwrap();
        store
            .put(&RecordKey::state_vector("a").unwrap(), b"sva")
            .unwrap();
        store.put(&update("b", 0, 0), b"ub").unwrap();
        store
            .put(&RecordKey::state_vector("b").unwrap(), b"svb")
            .unwrap();

        let records = store
            .scan_updates("a", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, b"ua");

        let vectors = store.scan_state_vectors().unwrap();
        let docs: Vec<&str> = vectors.iter().map(|r| r.key.doc.as_str()).collect();
        assert_eq!(docs, vec!["a", "b"]);
    }

    #[test]
    fn test_per_document_mode_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let config = StoreConfig {
            collection_mode: CollectionMode::PerDocument,
            ..StoreConfig::for_testing(&path)
        };
        {
            let store = RecordStore::open(config.clone()).unwrap();
            store.put(&update("a", 0, 0), b"ua").unwrap();
            store
                .put(&RecordKey::state_vector("a").unwrap(), b"sva")
                .unwrap();
        }
        let store = RecordStore::open(config).unwrap();
        let records = store
            .scan_updates("a", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.scan_state_vectors().unwrap().len(), 1);
    }

    #[test]
    fn test_destroy_removes_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = RecordStore::open(StoreConfig::for_testing(&path)).unwrap();
        store.put(&update("d", 0, 0), b"u").unwrap();
        store.destroy().unwrap();

        let reopened = RecordStore::open(StoreConfig::for_testing(&path)).unwrap();
        assert!(reopened
            .scan_updates("d", 0, keys::MAX_CLOCK, &ReadOptions::default())
            .unwrap()
            .is_empty());
    }
}
