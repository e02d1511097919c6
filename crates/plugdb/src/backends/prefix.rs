//! Keyspace partition view.
//!
//! [`PrefixDb`] exposes the keys of another database that start with a fixed
//! prefix, with the prefix stripped. Several views over one store give
//! independent keyspaces that still commit through the same engine.

use std::sync::Arc;

use crate::engine::range::prefix_end;
use crate::engine::{
    Batch, Database, DbIterator, KeyRange, Lifecycle, Stats, StorageError, StorageResult,
};

/// A view of `db` restricted to keys starting with `prefix`.
///
/// Closing the view does not close the underlying database.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use plugdb::backends::{MemDb, PrefixDb};
/// use plugdb::Database;
///
/// let db: Arc<dyn Database> = Arc::new(MemDb::new());
/// let accounts = PrefixDb::new(Arc::clone(&db), b"acc/");
/// accounts.set(b"alice", b"10")?;
/// assert_eq!(db.get(b"acc/alice")?, Some(b"10".to_vec()));
/// ```
pub struct PrefixDb<D = Arc<dyn Database>> {
    db: D,
    prefix: Vec<u8>,
    state: Lifecycle,
}

impl<D: Database> PrefixDb<D> {
    /// Create a view of `db` under `prefix`.
    pub fn new(db: D, prefix: impl Into<Vec<u8>>) -> Self {
        Self { db, prefix: prefix.into(), state: Lifecycle::new() }
    }

    /// The prefix every key of this view is stored under.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// The underlying database.
    pub fn inner(&self) -> &D {
        &self.db
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    /// Translate view bounds into bounds on the underlying database.
    fn inner_bounds(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> (Vec<u8>, Option<Vec<u8>>) {
        let lower = self.full_key(start.unwrap_or_default());
        let upper = match end {
            Some(end) => Some(self.full_key(end)),
            None => prefix_end(&self.prefix),
        };
        (lower, upper)
    }

    fn open_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.state.ensure_open()?;
        let domain = KeyRange::new(start, end)?;
        let (lower, upper) = self.inner_bounds(start, end);
        let inner = if reverse {
            self.db.reverse_iterator(Some(lower.as_slice()), upper.as_deref())?
        } else {
            self.db.iterator(Some(lower.as_slice()), upper.as_deref())?
        };
        Ok(Box::new(PrefixIterator { inner, strip: self.prefix.len(), domain }))
    }
}

impl<D: Database> Database for PrefixDb<D> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.state.ensure_open()?;
        self.db.get(&self.full_key(key))
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        self.state.ensure_open()?;
        self.db.has(&self.full_key(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()?;
        self.db.set(&self.full_key(key), value)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()?;
        self.db.set_sync(&self.full_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()?;
        self.db.delete(&self.full_key(key))
    }

    fn delete_sync(&self, key: &[u8]) -> StorageResult<()> {
        self.state.ensure_open()?;
        self.db.delete_sync(&self.full_key(key))
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.open_iterator(start, end, false)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.open_iterator(start, end, true)
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        self.state.ensure_open()?;
        let inner = self.db.new_batch()?;
        Ok(Box::new(PrefixBatch { view: self, inner }))
    }

    fn stats(&self) -> Stats {
        let mut stats = Stats::new();
        if self.state.is_closed() {
            return stats;
        }
        stats.insert("database.type".into(), "prefixDB".into());
        stats.insert("prefix.hex".into(), self.prefix.iter().map(|b| format!("{b:02X}")).collect());
        for (key, value) in self.db.stats() {
            stats.insert(format!("source.{key}"), value);
        }
        stats
    }

    fn flush(&self) -> StorageResult<()> {
        self.state.ensure_open()?;
        self.db.flush()
    }

    fn close(&self) -> StorageResult<()> {
        self.state.close()
    }
}

/// Iterator over the underlying database with the prefix stripped from keys.
struct PrefixIterator<'a> {
    inner: Box<dyn DbIterator + 'a>,
    strip: usize,
    domain: KeyRange,
}

impl DbIterator for PrefixIterator<'_> {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        self.domain.domain()
    }

    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn next(&mut self) -> StorageResult<()> {
        self.inner.next()
    }

    fn key(&self) -> StorageResult<&[u8]> {
        let key = self.inner.key()?;
        key.get(self.strip..).ok_or_else(|| {
            StorageError::Internal("prefix iterator yielded a key outside its prefix".into())
        })
    }

    fn value(&self) -> StorageResult<&[u8]> {
        self.inner.value()
    }

    fn error(&self) -> Option<&StorageError> {
        self.inner.error()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }
}

/// Batch that prefixes its keys and commits through the underlying batch.
struct PrefixBatch<'a, D> {
    view: &'a PrefixDb<D>,
    inner: Box<dyn Batch + 'a>,
}

impl<D> PrefixBatch<'_, D> {
    /// A write against a closed view still spends the batch.
    fn ensure_view_open(&mut self) -> StorageResult<()> {
        if let Err(e) = self.view.state.ensure_open() {
            self.inner.close()?;
            return Err(e);
        }
        Ok(())
    }
}

impl<D: Database> Batch for PrefixBatch<'_, D> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.inner.set(&self.view.full_key(key), value)
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.inner.delete(&self.view.full_key(key))
    }

    fn write(&mut self) -> StorageResult<()> {
        self.ensure_view_open()?;
        self.inner.write()
    }

    fn write_sync(&mut self) -> StorageResult<()> {
        self.ensure_view_open()?;
        self.inner.write_sync()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }

    fn len(&self) -> StorageResult<usize> {
        self.inner.len()
    }
}

/// Iterate every entry of `db` whose key starts with `prefix`, ascending.
///
/// Keys are returned whole, prefix included.
///
/// # Errors
///
/// Returns [`StorageError::AlreadyClosed`] after close.
pub fn prefix_iterator<'a, D: Database + ?Sized>(
    db: &'a D,
    prefix: &[u8],
) -> StorageResult<Box<dyn DbIterator + 'a>> {
    let end = prefix_end(prefix);
    db.iterator(Some(prefix), end.as_deref())
}
