//! Integration tests for the in-memory and null backends.


use engine_tests::{run_test_suite, TestHarness};
use plugdb::backends::{MemDb, NullDb};
use plugdb::{collect_entries, Database, StorageResult};

struct MemDbHarness;

impl TestHarness for MemDbHarness {
    type Db = MemDb;
    type Guard = ();

    fn create_db() -> StorageResult<(Self::Db, Self::Guard)> {
        Ok((MemDb::new(), ()))
    }
}

struct NullDbHarness;

impl TestHarness for NullDbHarness {
    type Db = NullDb;
    type Guard = ();
    const STORES_DATA: bool = false;

    fn create_db() -> StorageResult<(Self::Db, Self::Guard)> {
        Ok((NullDb::new(), ()))
    }
}

#[test]
fn test_memdb_compliance() {
    run_test_suite::<MemDbHarness>();
}

#[test]
fn test_nulldb_compliance() {
    run_test_suite::<NullDbHarness>();
}

#[test]
fn test_memdb_many_keys() {
    let db = MemDb::new();
    const NUM_KEYS: u32 = 10_000;

    let mut batch = db.new_batch().expect("failed to create batch");
    for i in 0..NUM_KEYS {
        batch.set(&i.to_be_bytes(), &i.to_le_bytes()).expect("failed to set");
    }
    batch.write().expect("failed to write");

    assert_eq!(db.len().expect("failed to read len"), NUM_KEYS as usize);
    assert_eq!(
        db.stats().get("database.size").map(String::as_str),
        Some(NUM_KEYS.to_string().as_str())
    );

    // Big-endian keys iterate in numeric order
    let entries = collect_entries(db.iterator(None, None).expect("failed to iterate"))
        .expect("failed to collect");
    for (i, (key, value)) in entries.iter().enumerate() {
        let i = i as u32;
        assert_eq!(key.as_slice(), i.to_be_bytes().as_slice());
        assert_eq!(value.as_slice(), i.to_le_bytes().as_slice());
    }
}

#[test]
fn test_memdb_shared_between_threads() {
    let db = MemDb::new();

    std::thread::scope(|s| {
        for t in 0..8u8 {
            let db = &db;
            s.spawn(move || {
                for i in 0..50u8 {
                    db.set(&[t, i], b"v").expect("failed to set");
                    assert!(db.has(&[t, i]).expect("failed to has"));
                }
            });
        }
    });

    assert_eq!(db.len().expect("failed to read len"), 400);
}

#[test]
fn test_nulldb_stats() {
    let db = NullDb::new();
    assert_eq!(db.stats().get("database.type").map(String::as_str), Some("nullDB"));
}
