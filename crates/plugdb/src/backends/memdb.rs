//! In-memory storage backend.
//!
//! [`MemDb`] keeps every entry in an ordered map behind a read/write lock.
//! Nothing is persisted: `set_sync` behaves exactly like `set` and all data is
//! gone once the handle is closed or dropped.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::engine::{
    Batch, BatchOp, BatchTarget, BufferedBatch, Database, DbIterator, Direction, KeyRange,
    KeyValue, Lifecycle, SnapshotIterator, Stats, StorageError, StorageResult,
};

/// The ordered map shared by the in-memory and log-structured backends.
pub(crate) type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Apply `ops` to `table` in order.
///
/// Returns the change in live payload bytes (keys plus values).
pub(crate) fn apply_ops(table: &mut Table, ops: Vec<BatchOp>) -> i64 {
    let mut delta = 0i64;
    for op in ops {
        match op {
            BatchOp::Set { key, value } => {
                let added = (key.len() + value.len()) as i64;
                let key_len = key.len();
                if let Some(old) = table.insert(key, value) {
                    delta -= (key_len + old.len()) as i64;
                }
                delta += added;
            }
            BatchOp::Delete { key } => {
                if let Some(old) = table.remove(&key) {
                    delta -= (key.len() + old.len()) as i64;
                }
            }
        }
    }
    delta
}

/// Live payload bytes held by `table`.
pub(crate) fn payload_bytes(table: &Table) -> u64 {
    table.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
}

/// Copy the entries of `range` out of `table`, ascending.
pub(crate) fn copy_range(table: &Table, range: &KeyRange) -> Vec<KeyValue> {
    table.range::<[u8], _>(range.as_bounds()).map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// A storage backend that lives entirely in memory.
///
/// Reads take a shared lock and never wait on each other; writes take the
/// exclusive lock for the duration of a single map update. Iterators copy
/// their range when created, so they see a true snapshot.
///
/// # Example
///
/// ```ignore
/// use plugdb::backends::MemDb;
/// use plugdb::Database;
///
/// let db = MemDb::new();
/// db.set(b"key", b"value")?;
/// assert!(db.has(b"key")?);
/// ```
#[derive(Debug, Default)]
pub struct MemDb {
    table: RwLock<Table>,
    state: Lifecycle,
}

impl MemDb {
    /// Create an empty in-memory database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a database from existing entries.
    pub(crate) fn from_table(table: Table) -> Self {
        Self { table: RwLock::new(table), state: Lifecycle::new() }
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.read()?.len())
    }

    /// Whether the database holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.read()?.is_empty())
    }

    pub(crate) fn read(&self) -> StorageResult<RwLockReadGuard<'_, Table>> {
        self.state.ensure_open()?;
        self.table.read().map_err(StorageError::poisoned)
    }

    pub(crate) fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Table>> {
        self.state.ensure_open()?;
        self.table.write().map_err(StorageError::poisoned)
    }

    pub(crate) fn snapshot(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
    ) -> StorageResult<SnapshotIterator> {
        let range = KeyRange::new(start, end)?;
        let entries = copy_range(&*self.read()?, &range);
        Ok(SnapshotIterator::new(range, entries, direction))
    }
}

impl Database for MemDb {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.read()?.contains_key(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.write()?.remove(key);
        Ok(())
    }

    fn delete_sync(&self, key: &[u8]) -> StorageResult<()> {
        self.delete(key)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        Ok(Box::new(self.snapshot(start, end, Direction::Forward)?))
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        Ok(Box::new(self.snapshot(start, end, Direction::Reverse)?))
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(BufferedBatch::new(self)))
    }

    fn stats(&self) -> Stats {
        let mut stats = Stats::new();
        if let Ok(table) = self.read() {
            stats.insert("database.type".into(), "memDB".into());
            stats.insert("database.size".into(), table.len().to_string());
        }
        stats
    }

    fn close(&self) -> StorageResult<()> {
        self.state.close()?;
        // Release memory even if a writer panicked while holding the lock.
        let mut table = self.table.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        debug!(entries = table.len(), "closing memdb");
        table.clear();
        Ok(())
    }
}

impl BatchTarget for MemDb {
    fn apply_batch(&self, ops: Vec<BatchOp>, _sync: bool) -> StorageResult<()> {
        apply_ops(&mut *self.write()?, ops);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value_is_not_absent() {
        let db = MemDb::new();
        db.set(b"k", b"").unwrap();

        assert_eq!(db.get(b"k").unwrap(), Some(Vec::new()));
        assert!(db.has(b"k").unwrap());
        assert_eq!(db.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_empty_key_is_valid() {
        let db = MemDb::new();
        db.set(b"", b"root").unwrap();
        assert_eq!(db.get(b"").unwrap(), Some(b"root".to_vec()));
    }

    #[test]
    fn test_snapshot_ignores_later_writes() {
        let db = MemDb::new();
        db.set(b"a", b"1").unwrap();
        db.set(b"b", b"2").unwrap();

        let mut iter = db.iterator(None, None).unwrap();
        db.delete(b"b").unwrap();
        db.set(b"c", b"3").unwrap();

        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().unwrap().to_vec());
            iter.next().unwrap();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_stats_after_close_is_empty() {
        let db = MemDb::new();
        db.set(b"a", b"1").unwrap();
        assert_eq!(db.stats().get("database.size").map(String::as_str), Some("1"));

        db.close().unwrap();
        assert!(db.stats().is_empty());
        assert!(matches!(db.len(), Err(StorageError::AlreadyClosed)));
    }

    #[test]
    fn test_apply_ops_tracks_payload() {
        let mut table = Table::new();
        let ops = vec![
            BatchOp::Set { key: b"ab".to_vec(), value: b"123".to_vec() },
            BatchOp::Set { key: b"ab".to_vec(), value: b"1".to_vec() },
            BatchOp::Set { key: b"c".to_vec(), value: b"xy".to_vec() },
            BatchOp::Delete { key: b"c".to_vec() },
            BatchOp::Delete { key: b"missing".to_vec() },
        ];

        let delta = apply_ops(&mut table, ops);

        assert_eq!(delta, 3);
        assert_eq!(payload_bytes(&table), 3);
        assert_eq!(table.get(b"ab".as_slice()), Some(&b"1".to_vec()));
    }
}
