//! A backend that stores nothing.
//!
//! Writes succeed and vanish, reads find nothing and iterators are empty.
//! Useful where a component needs a [`Database`] but its data is
//! disposable.

use crate::engine::{
    Batch, BatchOp, BatchTarget, BufferedBatch, Database, DbIterator, KeyRange, Lifecycle,
    SnapshotIterator, Stats, StorageResult,
};

/// A database that accepts every write and keeps none of them.
#[derive(Debug, Default)]
pub struct NullDb {
    state: Lifecycle,
}

impl NullDb {
    /// Create a new null database.
    pub fn new() -> Self {
        Self::default()
    }

    fn empty_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(SnapshotIterator::empty(KeyRange::new(start, end)?)))
    }
}

impl Database for NullDb {
    fn get(&self, _key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.state.ensure_open()?;
        Ok(None)
    }

    fn has(&self, _key: &[u8]) -> StorageResult<bool> {
        self.state.ensure_open()?;
        Ok(false)
    }

    fn set(&self, _key: &[u8], _value: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()
    }

    fn set_sync(&self, _key: &[u8], _value: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()
    }

    fn delete(&self, _key: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()
    }

    fn delete_sync(&self, _key: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.empty_iterator(start, end)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.empty_iterator(start, end)
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(BufferedBatch::new(self)))
    }

    fn stats(&self) -> Stats {
        let mut stats = Stats::new();
        if !self.state.is_closed() {
            stats.insert("database.type".into(), "nullDB".into());
        }
        stats
    }

    fn close(&self) -> StorageResult<()> {
        self.state.close()
    }
}

impl BatchTarget for NullDb {
    fn apply_batch(&self, _ops: Vec<BatchOp>, _sync: bool) -> StorageResult<()> {
        self.state.ensure_open()
    }
}
