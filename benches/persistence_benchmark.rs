use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::tempdir;
use yrocks::{chunks, DocPersistence, ReadOptions, RecordStore, StoreConfig};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, WriteTxn};

/// Capture one edit of a live doc as an incremental yrs update.
fn edit(doc: &Doc, insert: &str) -> Vec<u8> {
    let before = doc.transact().state_vector().encode_v1();
    {
        let mut txn = doc.transact_mut();
        let text = txn.get_or_insert_text("content");
        let len = text.get_string(&txn).len() as u32;
        text.insert(&mut txn, len, insert);
    }
    doc.transact()
        .encode_state_as_update_v1(&StateVector::decode_v1(&before).unwrap())
}

fn bench_append_small_update(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let persistence =
        DocPersistence::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
    let session = Doc::new();
    let update = edit(&session, "benchmark edit ");

    c.bench_function("append_small_update", |b| {
        b.iter(|| {
            black_box(persistence.store_update("bench", black_box(&update)).unwrap());
        })
    });
}

fn bench_read_log_100_updates(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let persistence =
        DocPersistence::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
    let session = Doc::new();
    for i in 0..100 {
        persistence
            .store_update("bench", &edit(&session, &format!("edit {i} ")))
            .unwrap();
    }

    c.bench_function("read_log_100_updates", |b| {
        b.iter(|| {
            black_box(persistence.get_updates(black_box("bench")).unwrap());
        })
    });
}

fn bench_current_clock(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let persistence =
        DocPersistence::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
    let session = Doc::new();
    for i in 0..50 {
        persistence
            .store_update("bench", &edit(&session, &format!("{i}")))
            .unwrap();
    }

    c.bench_function("current_clock", |b| {
        b.iter(|| {
            black_box(persistence.get_current_clock(black_box("bench")).unwrap());
        })
    });
}

fn bench_flush_small_log(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let persistence =
        DocPersistence::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
    let session = Doc::new();
    for i in 0..20 {
        persistence
            .store_update("bench", &edit(&session, &format!("edit {i} ")))
            .unwrap();
    }

    // Each iteration re-flushes the (already compacted) log; the cost
    // measured is the fold + baseline swap, not log length.
    c.bench_function("flush_compacted_log", |b| {
        b.iter(|| {
            black_box(persistence.compact(black_box("bench")).unwrap());
        })
    });
}

fn bench_chunked_put_4mb(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        RecordStore::open(StoreConfig {
            max_record_size: 1_000_000,
            ..StoreConfig::for_testing(dir.path().join("db"))
        })
        .unwrap(),
    );
    let payload: Vec<u8> = (0..4_000_000usize).map(|i| (i % 251) as u8).collect();
    let mut clock = 0u32;

    c.bench_function("chunked_put_4mb", |b| {
        b.iter(|| {
            black_box(chunks::put_chunked(&store, "bench", clock, black_box(&payload)).unwrap());
            clock += 1;
        })
    });
}

fn bench_chunked_read_4mb(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        RecordStore::open(StoreConfig {
            max_record_size: 1_000_000,
            ..StoreConfig::for_testing(dir.path().join("db"))
        })
        .unwrap(),
    );
    let payload: Vec<u8> = (0..4_000_000usize).map(|i| (i % 251) as u8).collect();
    chunks::put_chunked(&store, "bench", 0, &payload).unwrap();

    c.bench_function("chunked_read_4mb", |b| {
        b.iter(|| {
            let records = store
                .scan_updates("bench", 0, u32::MAX, &ReadOptions::default())
                .unwrap();
            black_box(chunks::reassemble("bench", &records).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_append_small_update,
    bench_read_log_100_updates,
    bench_current_clock,
    bench_flush_small_log,
    bench_chunked_put_4mb,
    bench_chunked_read_4mb,
);
criterion_main!(benches);
