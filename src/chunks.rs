//! Chunking and reassembly for oversized payloads.
//!
//! RocksDB handles multi-megabyte values, but the store enforces a
//! per-record ceiling (`StoreConfig::max_record_size`) so one update
//! can never produce a record the backend refuses. A payload over the
//! ceiling is split into contiguous slices written as parts 1..=k under
//! the same clock; a payload at or under it is written whole with
//! part 0. All parts of one call go through a single atomic write
//! batch, so the store never holds a partially written chunk run.
//!
//! Reassembly is the inverse and is deliberately strict: a clock group
//! must be either a single part-0 record or a gap-free 1..=k run. Any
//! gap, duplicate, or whole/part mix is an integrity fault surfaced to
//! the caller, never truncated output.

use crate::error::PersistenceError;
use crate::keys::{RecordKey, RecordKind};
use crate::store::{RawRecord, RecordStore};

/// Write one logical payload under `(doc, clock)`, splitting it into
/// parts when it exceeds the store's per-record ceiling. Returns the
/// number of physical records written.
pub fn put_chunked(
    store: &RecordStore,
    doc: &str,
    clock: u32,
    payload: &[u8],
) -> Result<u32, PersistenceError> {
    let ceiling = store.config().max_record_size;
    if payload.len() <= ceiling {
        store.put(&RecordKey::update(doc, clock, 0)?, payload)?;
        return Ok(1);
    }

    let mut items: Vec<(RecordKey, &[u8])> = Vec::with_capacity(payload.len() / ceiling + 1);
    for (i, slice) in payload.chunks(ceiling).enumerate() {
        items.push((RecordKey::update(doc, clock, i as u32 + 1)?, slice));
    }
    store.put_many(&items)?;
    log::debug!(
        "chunked {} bytes for {doc:?} clock {clock} into {} parts",
        payload.len(),
        items.len()
    );
    Ok(items.len() as u32)
}

/// Reassemble scanned update records into `(clock, payload)` pairs,
/// preserving the scan's group order (ascending or descending clocks).
///
/// Each maximal run of records sharing one clock must be either a
/// single part-0 record or a complete 1..=k part sequence; parts are
/// concatenated verbatim in ascending part order.
pub fn reassemble(
    doc: &str,
    records: &[RawRecord],
) -> Result<Vec<(u32, Vec<u8>)>, PersistenceError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < records.len() {
        let (clock, _) = update_fields(doc, &records[i])?;
        let mut j = i + 1;
        while j < records.len() && update_fields(doc, &records[j])?.0 == clock {
            j += 1;
        }
        out.push((clock, assemble_group(doc, clock, &records[i..j])?));
        i = j;
    }
    Ok(out)
}

fn assemble_group(doc: &str, clock: u32, group: &[RawRecord]) -> Result<Vec<u8>, PersistenceError> {
    let mut parts: Vec<(u32, &[u8])> = Vec::with_capacity(group.len());
    let mut has_whole = false;
    for record in group {
        let (_, part) = update_fields(doc, record)?;
        if part == 0 {
            has_whole = true;
        }
        parts.push((part, &record.value));
    }

    if has_whole {
        if group.len() > 1 {
            return Err(integrity(doc, clock, "whole record mixed with chunk parts"));
        }
        return Ok(group[0].value.clone());
    }

    // Scans may deliver parts in descending order; the run is validated
    // against ascending 1..=k after sorting.
    parts.sort_by_key(|(part, _)| *part);
    let mut payload = Vec::with_capacity(parts.iter().map(|(_, v)| v.len()).sum());
    for (i, (part, value)) in parts.iter().enumerate() {
        let expected = i as u32 + 1;
        if *part != expected {
            let detail = if *part < expected {
                format!("duplicate part {part}")
            } else {
                format!("missing part {expected}, found part {part}")
            };
            return Err(integrity(doc, clock, &detail));
        }
        payload.extend_from_slice(value);
    }
    Ok(payload)
}

fn update_fields(doc: &str, record: &RawRecord) -> Result<(u32, u32), PersistenceError> {
    match record.key.kind {
        RecordKind::Update { clock, part } => Ok((clock, part)),
        ref other => Err(PersistenceError::Validation(format!(
            "cannot reassemble non-update record {other:?} for {doc:?}"
        ))),
    }
}

fn integrity(doc: &str, clock: u32, detail: &str) -> PersistenceError {
    PersistenceError::Integrity {
        doc: doc.to_string(),
        clock,
        detail: detail.to_string(),
    }
}
