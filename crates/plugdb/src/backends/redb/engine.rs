//! Redb database implementation.
//!
//! This module provides the `RedbDb` type which implements the `Database`
//! trait using the Redb embedded database.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use redb::{Durability, ReadableTableMetadata};
use tracing::debug;

use crate::engine::{
    Batch, BatchOp, BatchTarget, BufferedBatch, Database, DbIterator, Direction, KeyRange,
    Lifecycle, Stats, StorageError, StorageResult,
};

use super::iterator::{RedbIterator, DEFAULT_BATCH_SIZE};
use super::tables::{storage_err, DATA_TABLE};

const BACKEND: &str = "redb";

/// Configuration options for the Redb storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedbConfig {
    /// Cache size in bytes.
    /// If not set, uses Redb's default.
    pub cache_size: Option<usize>,

    /// Entries fetched per iterator batch.
    pub iterator_batch_size: usize,
}

impl Default for RedbConfig {
    fn default() -> Self {
        Self { cache_size: None, iterator_batch_size: DEFAULT_BATCH_SIZE }
    }
}

impl RedbConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache size.
    #[must_use]
    pub const fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }

    /// Set how many entries an iterator loads at a time.
    #[must_use]
    pub const fn iterator_batch_size(mut self, size: usize) -> Self {
        self.iterator_batch_size = size;
        self
    }
}

/// A storage backend backed by Redb.
///
/// Redb is a pure-Rust embedded database with copy-on-write B-trees and MVCC
/// read transactions. Each `set`/`delete` is its own write transaction;
/// `set`/`delete` commit with [`Durability::None`] and become durable with
/// the next durable commit, while the `_sync` variants, `write_sync` and
/// [`Database::flush`] commit with [`Durability::Immediate`].
///
/// # Example
///
/// ```ignore
/// use plugdb::backends::RedbDb;
/// use plugdb::Database;
///
/// let db = RedbDb::open("my_database.redb")?;
/// db.set_sync(b"user:1", b"Alice")?;
/// assert_eq!(db.get(b"user:1")?, Some(b"Alice".to_vec()));
/// ```
pub struct RedbDb {
    path: Option<PathBuf>,
    /// The underlying Redb database; `None` once closed.
    db: RwLock<Option<redb::Database>>,
    config: RedbConfig,
    state: Lifecycle,
}

impl RedbDb {
    /// Open or create a database at the given path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackendOpen`] if the database cannot be opened
    /// or created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, RedbConfig::default())
    }

    /// Open or create a database at the given path with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackendOpen`] if the database cannot be opened
    /// or created.
    pub fn open_with_config(path: impl AsRef<Path>, config: RedbConfig) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut builder = redb::Database::builder();

        if let Some(cache_size) = config.cache_size {
            builder.set_cache_size(cache_size);
        }

        let db = builder.create(&path).map_err(|e| StorageError::open(BACKEND, e))?;
        debug!(path = %path.display(), "opened redb");
        Self::init(db, Some(path), config)
    }

    /// Create an in-memory database for testing.
    ///
    /// The database will be lost when it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackendOpen`] if the database cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        let db = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| StorageError::open(BACKEND, e))?;
        Self::init(db, None, RedbConfig::default())
    }

    fn init(db: redb::Database, path: Option<PathBuf>, config: RedbConfig) -> StorageResult<Self> {
        // Create the data table up front so readers never meet a missing table.
        create_data_table(&db).map_err(|e| StorageError::open(BACKEND, e))?;

        Ok(Self { path, db: RwLock::new(Some(db)), config, state: Lifecycle::new() })
    }

    /// Path of the database file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the open database.
    fn with_db<T>(&self, f: impl FnOnce(&redb::Database) -> StorageResult<T>) -> StorageResult<T> {
        self.state.ensure_open()?;
        let guard = self.db.read().map_err(StorageError::poisoned)?;
        let db = guard.as_ref().ok_or(StorageError::AlreadyClosed)?;
        f(db)
    }

    /// Apply `ops` in a single write transaction.
    fn write_ops(&self, ops: Vec<BatchOp>, durability: Durability) -> StorageResult<()> {
        self.with_db(|db| {
            let mut tx = db.begin_write().map_err(storage_err)?;
            tx.set_durability(durability);
            {
                let mut table = tx.open_table(DATA_TABLE).map_err(storage_err)?;
                for op in &ops {
                    match op {
                        BatchOp::Set { key, value } => {
                            table.insert(key.as_slice(), value.as_slice()).map_err(storage_err)?;
                        }
                        BatchOp::Delete { key } => {
                            table.remove(key.as_slice()).map_err(storage_err)?;
                        }
                    }
                }
            }
            // Dropping an uncommitted transaction aborts it, so a failed op
            // above leaves nothing behind.
            tx.commit().map_err(storage_err)
        })
    }

    fn open_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        let range = KeyRange::new(start, end)?;
        let iter = self.with_db(|db| {
            let tx = db.begin_read().map_err(storage_err)?;
            let table = tx.open_table(DATA_TABLE).map_err(storage_err)?;
            RedbIterator::new(table, range, direction, self.config.iterator_batch_size)
        })?;
        Ok(Box::new(iter))
    }

    fn durable_commit(db: &redb::Database) -> StorageResult<()> {
        let mut tx = db.begin_write().map_err(storage_err)?;
        tx.set_durability(Durability::Immediate);
        tx.commit().map_err(storage_err)
    }
}

fn create_data_table(db: &redb::Database) -> Result<(), redb::Error> {
    let tx = db.begin_write()?;
    tx.open_table(DATA_TABLE)?;
    tx.commit()?;
    Ok(())
}

impl Database for RedbDb {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.with_db(|db| {
            let tx = db.begin_read().map_err(storage_err)?;
            let table = tx.open_table(DATA_TABLE).map_err(storage_err)?;
            let value = table.get(key).map_err(storage_err)?;
            Ok(value.map(|v| v.value().to_vec()))
        })
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        self.with_db(|db| {
            let tx = db.begin_read().map_err(storage_err)?;
            let table = tx.open_table(DATA_TABLE).map_err(storage_err)?;
            Ok(table.get(key).map_err(storage_err)?.is_some())
        })
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let op = BatchOp::Set { key: key.to_vec(), value: value.to_vec() };
        self.write_ops(vec![op], Durability::None)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let op = BatchOp::Set { key: key.to_vec(), value: value.to_vec() };
        self.write_ops(vec![op], Durability::Immediate)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.write_ops(vec![BatchOp::Delete { key: key.to_vec() }], Durability::None)
    }

    fn delete_sync(&self, key: &[u8]) -> StorageResult<()> {
        self.write_ops(vec![BatchOp::Delete { key: key.to_vec() }], Durability::Immediate)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.open_iterator(start, end, Direction::Forward)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.open_iterator(start, end, Direction::Reverse)
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(BufferedBatch::new(self)))
    }

    fn stats(&self) -> Stats {
        let collected = self.with_db(|db| {
            let tx = db.begin_read().map_err(storage_err)?;
            let table = tx.open_table(DATA_TABLE).map_err(storage_err)?;
            let len = table.len().map_err(storage_err)?;
            let table_stats = table.stats().map_err(storage_err)?;

            let mut stats = Stats::new();
            stats.insert("database.type".into(), "redb".into());
            stats.insert("database.size".into(), len.to_string());
            stats.insert("table.tree_height".into(), table_stats.tree_height().to_string());
            stats.insert("table.stored_bytes".into(), table_stats.stored_bytes().to_string());
            stats.insert("table.leaf_pages".into(), table_stats.leaf_pages().to_string());
            stats.insert("table.branch_pages".into(), table_stats.branch_pages().to_string());
            stats.insert(
                "table.fragmented_bytes".into(),
                table_stats.fragmented_bytes().to_string(),
            );
            Ok(stats)
        });
        collected.unwrap_or_default()
    }

    fn flush(&self) -> StorageResult<()> {
        self.with_db(Self::durable_commit)
    }

    fn close(&self) -> StorageResult<()> {
        self.state.close()?;
        let db = self.db.write().unwrap_or_else(PoisonError::into_inner).take();
        let Some(db) = db else {
            return Ok(());
        };

        // Non-durable commits are only persisted by a later durable one.
        let flushed = Self::durable_commit(&db);
        drop(db);
        debug!(path = ?self.path, "closed redb");
        flushed
    }
}

impl BatchTarget for RedbDb {
    fn apply_batch(&self, ops: Vec<BatchOp>, sync: bool) -> StorageResult<()> {
        if ops.is_empty() {
            return self.state.ensure_open();
        }
        let durability = if sync { Durability::Immediate } else { Durability::None };
        self.write_ops(ops, durability)
    }
}
