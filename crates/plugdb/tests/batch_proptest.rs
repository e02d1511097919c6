//! Property tests: a batch has the same effect as applying its operations
//! one at a time.

use std::collections::BTreeMap;

use plugdb::backends::{LogDb, MemDb, RedbDb};
use plugdb::{collect_entries, BatchOp, Database};
use proptest::prelude::*;

fn op_strategy() -> impl Strategy<Value = BatchOp> {
    // A small key alphabet so operations collide often
    let key = prop::collection::vec(0u8..4, 0..3);
    let value = prop::collection::vec(any::<u8>(), 0..8);
    prop_oneof![
        (key.clone(), value).prop_map(|(key, value)| BatchOp::Set { key, value }),
        key.prop_map(|key| BatchOp::Delete { key }),
    ]
}

fn apply_sequentially(db: &impl Database, ops: &[BatchOp]) {
    for op in ops {
        match op {
            BatchOp::Set { key, value } => db.set(key, value).expect("failed to set"),
            BatchOp::Delete { key } => db.delete(key).expect("failed to delete"),
        }
    }
}

fn apply_as_batch(db: &impl Database, ops: &[BatchOp]) {
    let mut batch = db.new_batch().expect("failed to create batch");
    for op in ops {
        match op {
            BatchOp::Set { key, value } => batch.set(key, value).expect("failed to set"),
            BatchOp::Delete { key } => batch.delete(key).expect("failed to delete"),
        }
    }
    batch.write().expect("failed to write");
}

fn contents(db: &impl Database) -> Vec<(Vec<u8>, Vec<u8>)> {
    collect_entries(db.iterator(None, None).expect("failed to iterate")).expect("failed to collect")
}

fn model(ops: &[BatchOp]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut map = BTreeMap::new();
    for op in ops {
        match op {
            BatchOp::Set { key, value } => {
                map.insert(key.clone(), value.clone());
            }
            BatchOp::Delete { key } => {
                map.remove(key);
            }
        }
    }
    map.into_iter().collect()
}

proptest! {
    #[test]
    fn memdb_batch_matches_sequential(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let sequential = MemDb::new();
        let batched = MemDb::new();
        apply_sequentially(&sequential, &ops);
        apply_as_batch(&batched, &ops);

        let expected = model(&ops);
        prop_assert_eq!(contents(&sequential), expected.clone());
        prop_assert_eq!(contents(&batched), expected);
    }

    #[test]
    fn redb_batch_matches_sequential(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let sequential = RedbDb::in_memory().expect("failed to open");
        let batched = RedbDb::in_memory().expect("failed to open");
        apply_sequentially(&sequential, &ops);
        apply_as_batch(&batched, &ops);

        prop_assert_eq!(contents(&sequential), contents(&batched));
        prop_assert_eq!(contents(&batched), model(&ops));
    }

    #[test]
    fn logdb_batch_survives_replay(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("prop.logdb");
        {
            let db = LogDb::open(&path).expect("failed to open");
            apply_as_batch(&db, &ops);
            db.close().expect("failed to close");
        }

        let db = LogDb::open(&path).expect("failed to reopen");
        prop_assert_eq!(contents(&db), model(&ops));
    }
}
