//! Read-side request coalescing.
//!
//! Many callers asking for different documents' update logs inside one
//! scheduling window become a single merged store query:
//!
//! ```text
//! enqueue("a") ──┐
//! enqueue("b") ──┼──► pending buffer ──► one scan over {a, b, c} ──► demux
//! enqueue("c") ──┘        (window)
//! ```
//!
//! The first enqueue after an empty buffer arms the window; with the
//! default zero-length window the flush task merely yields back to the
//! scheduler, so everything enqueued in the current tick shares one
//! query. A longer window trades read latency for fewer queries —
//! `CoalescerConfig::window` is the tunable.
//!
//! The buffer swap and the window disarm happen together under the
//! lock, before the merged query runs. An enqueue arriving while the
//! query executes therefore starts a fresh window instead of racing
//! into the in-flight one, and no query is lost or answered twice.
//!
//! Coalescing is refused up front when the store keeps one collection
//! per document, when the query is not update-kind, or when it carries
//! read options — each a usage error before anything is buffered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::chunks;
use crate::error::PersistenceError;
use crate::keys;
use crate::store::{CollectionMode, RawRecord, ReadOptions, RecordStore};

/// Coalescer tuning.
#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    /// How long a window stays open after its first enqueue. Zero means
    /// "the remainder of the current scheduler tick".
    pub window: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            window: Duration::ZERO,
        }
    }
}

/// What kind of records a queued read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Update,
    StateVector,
    Meta,
}

/// One caller's read request.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub doc: String,
    pub kind: QueryKind,
    pub opts: ReadOptions,
}

impl LogQuery {
    /// A plain full-log read, the only coalescible shape.
    pub fn updates(doc: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            kind: QueryKind::Update,
            opts: ReadOptions::default(),
        }
    }
}

type ReadResult = Result<Vec<Vec<u8>>, PersistenceError>;

struct Waiter {
    doc: String,
    tx: oneshot::Sender<ReadResult>,
}

#[derive(Default)]
struct WindowState {
    pending: Vec<Waiter>,
    armed: bool,
}

/// Batches concurrent per-document update reads into one merged query.
pub struct ReadCoalescer {
    store: Arc<RecordStore>,
    config: CoalescerConfig,
    window: Arc<Mutex<WindowState>>,
}

impl ReadCoalescer {
    pub fn new(store: Arc<RecordStore>, config: CoalescerConfig) -> Self {
        Self {
            store,
            config,
            window: Arc::new(Mutex::new(WindowState::default())),
        }
    }

    /// Queue a read into the current window and wait for its slice of
    /// the merged result. Unsupported queries are rejected before
    /// anything is buffered.
    pub async fn enqueue(&self, query: LogQuery) -> ReadResult {
        if self.store.config().collection_mode == CollectionMode::PerDocument {
            return Err(PersistenceError::Usage(
                "coalescing requires a shared collection; this store keeps one per document"
                    .into(),
            ));
        }
        if query.kind != QueryKind::Update {
            return Err(PersistenceError::Usage(format!(
                "only update reads can be coalesced, got {:?}",
                query.kind
            )));
        }
        if query.opts != ReadOptions::default() {
            return Err(PersistenceError::Usage(
                "coalesced reads cannot carry limit or reverse options".into(),
            ));
        }
        keys::validate_doc_name(&query.doc)?;

        let (tx, rx) = oneshot::channel();
        let arm = {
            let mut window = self.lock_window();
            window.pending.push(Waiter { doc: query.doc, tx });
            if window.armed {
                false
            } else {
                window.armed = true;
                true
            }
        };

        if arm {
            let store = self.store.clone();
            let state = self.window.clone();
            let delay = self.config.window;
            tokio::spawn(async move {
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
                flush_window(&store, &state);
            });
        }

        rx.await.unwrap_or(Err(PersistenceError::Shutdown))
    }

    /// Number of reads waiting in the open window.
    pub fn pending(&self) -> usize {
        self.lock_window().pending.len()
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn flush_window(store: &RecordStore, state: &Mutex<WindowState>) {
    // Take the buffer and disarm in one critical section, before the
    // query runs: a late enqueue must open a new window, not join this
    // one.
    let pending = {
        let mut window = state.lock().unwrap_or_else(|e| e.into_inner());
        window.armed = false;
        std::mem::take(&mut window.pending)
    };
    if pending.is_empty() {
        return;
    }

    let mut docs: Vec<String> = Vec::new();
    for waiter in &pending {
        if !docs.iter().any(|d| d == &waiter.doc) {
            docs.push(waiter.doc.clone());
        }
    }
    log::debug!(
        "coalesced {} reads over {} documents into one query",
        pending.len(),
        docs.len()
    );

    match run_merged(store, &docs) {
        Ok(per_doc) => {
            // Waiters may share a document, so each gets its own copy.
            for waiter in pending {
                let payloads = per_doc.get(&waiter.doc).cloned().unwrap_or_default();
                let _ = waiter.tx.send(Ok(payloads));
            }
        }
        Err(e) => {
            for waiter in pending {
                let _ = waiter.tx.send(Err(e.clone()));
            }
        }
    }
}

fn run_merged(
    store: &RecordStore,
    docs: &[String],
) -> Result<HashMap<String, Vec<Vec<u8>>>, PersistenceError> {
    let records = store.scan_updates_multi(docs)?;
    let mut grouped: HashMap<String, Vec<RawRecord>> = HashMap::new();
    for record in records {
        grouped
            .entry(record.key.doc.clone())
            .or_default()
            .push(record);
    }
    let mut out = HashMap::with_capacity(grouped.len());
    for (doc, records) in grouped {
        let payloads = chunks::reassemble(&doc, &records)?
            .into_iter()
            .map(|(_, payload)| payload)
            .collect();
        out.insert(doc, payloads);
    }
    Ok(out)
}
