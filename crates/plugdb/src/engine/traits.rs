//! Core storage traits.
//!
//! This module defines the contract every backend satisfies:
//!
//! - [`Database`] - The façade callers program against
//! - [`Batch`] - An atomic group of pending writes
//! - [`DbIterator`] - Ordered iteration over a key range
//!
//! [`Database`] is object-safe; the registry hands out `Box<dyn Database>` so
//! callers never name a concrete engine.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use super::{StorageError, StorageResult};

/// A key-value pair produced by iteration.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Opaque, backend-specific diagnostics.
pub type Stats = BTreeMap<String, String>;

/// A key-value database backed by one storage engine.
///
/// All methods take `&self`: implementations synchronise internally so a
/// single handle can be shared across threads (`Send + Sync`). Batches and
/// iterators borrow the database, so it always outlives them.
///
/// # Lifecycle
///
/// A database starts open and moves to closed on [`Database::close`]. Every
/// operation on a closed database fails with [`StorageError::AlreadyClosed`],
/// except [`Database::stats`] which returns an empty map.
///
/// # Example
///
/// ```ignore
/// use plugdb::{new_db, Database};
///
/// let db = new_db("state", "memdb", "")?;
/// db.set(b"a", b"1")?;
/// assert_eq!(db.get(b"a")?, Some(b"1".to_vec()));
///
/// let mut batch = db.new_batch()?;
/// batch.set(b"b", b"2")?;
/// batch.delete(b"a")?;
/// batch.write()?;
/// db.close()?;
/// ```
pub trait Database: Send + Sync {
    /// Get the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist. An empty stored value is
    /// returned as `Ok(Some(vec![]))`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or a backend fault.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Check whether `key` exists without copying its value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or a backend fault.
    fn has(&self, key: &[u8]) -> StorageResult<bool>;

    /// Insert or replace the value stored under `key`.
    ///
    /// The write is visible to every subsequent read on this handle.
    /// Durability is backend-defined; see [`Database::set_sync`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or a backend fault.
    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Like [`Database::set`], but durable before returning.
    ///
    /// Backends without a durability concept treat this as `set`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or a backend fault.
    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or a backend fault.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Like [`Database::delete`], but durable before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or a backend fault.
    fn delete_sync(&self, key: &[u8]) -> StorageResult<()>;

    /// Iterate `[start, end)` in ascending key order.
    ///
    /// `None` leaves that side of the range open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] if `start > end`, or
    /// [`StorageError::AlreadyClosed`] after close.
    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>>;

    /// Iterate `[start, end)` in descending key order.
    ///
    /// # Errors
    ///
    /// Same as [`Database::iterator`].
    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>>;

    /// Create an empty batch bound to this database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close.
    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>>;

    /// Backend diagnostics. Never fails; empty if unsupported or closed.
    fn stats(&self) -> Stats;

    /// Write every entry to `out`, one `[KEY]:\t[VALUE]` line each, in
    /// uppercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or
    /// [`StorageError::Io`] if writing fails.
    fn print_to(&self, out: &mut dyn Write) -> StorageResult<()> {
        let mut iter = self.iterator(None, None)?;
        while iter.valid() {
            writeln!(out, "[{}]:\t[{}]", hex_upper(iter.key()?), hex_upper(iter.value()?))?;
            iter.next()?;
        }
        if let Some(err) = iter.error() {
            return Err(StorageError::Internal(err.to_string()));
        }
        iter.close()
    }

    /// Dump every entry to standard output for debugging.
    ///
    /// # Errors
    ///
    /// Same as [`Database::print_to`].
    fn print(&self) -> StorageResult<()> {
        self.print_to(&mut std::io::stdout().lock())
    }

    /// Make every acknowledged write durable.
    ///
    /// The default implementation does nothing, for backends that either
    /// have no durability or make every commit durable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or
    /// [`StorageError::Io`] if the flush fails.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Release every resource held by the backend.
    ///
    /// Callers must quiesce other users of the handle first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] if already closed.
    fn close(&self) -> StorageResult<()>;
}

/// An accumulator of pending writes committed atomically.
///
/// Operations are invisible to readers until [`Batch::write`] or
/// [`Batch::write_sync`]. Within one batch, a later operation on a key
/// overrides an earlier one. A batch is spent after write or close, and every
/// further call fails with [`StorageError::BatchClosed`].
pub trait Batch {
    /// Queue an upsert.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once the batch is spent.
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Queue a delete.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once the batch is spent.
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Apply every queued operation atomically, then spend the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once spent, or the backend's
    /// failure. On failure nothing was applied.
    fn write(&mut self) -> StorageResult<()>;

    /// Like [`Batch::write`], but durable before returning.
    ///
    /// # Errors
    ///
    /// Same as [`Batch::write`].
    fn write_sync(&mut self) -> StorageResult<()>;

    /// Discard the batch without applying it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once spent.
    fn close(&mut self) -> StorageResult<()>;

    /// Number of queued operations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once spent.
    fn len(&self) -> StorageResult<usize>;

    /// Whether no operation is queued.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once spent.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// A cursor over a key range with a fixed direction.
///
/// A fresh iterator is positioned at the first entry of its range (the last
/// one for reverse iterators). Keys are strictly increasing for ascending
/// iterators and strictly decreasing for reverse ones.
///
/// # Iteration Pattern
///
/// ```ignore
/// let mut iter = db.iterator(Some(b"a".as_slice()), None)?;
/// while iter.valid() {
///     println!("{:?} => {:?}", iter.key()?, iter.value()?);
///     iter.next()?;
/// }
/// if let Some(err) = iter.error() {
///     // a backend fault cut the scan short
/// }
/// iter.close()?;
/// ```
pub trait DbIterator {
    /// The `[start, end)` bounds the iterator was created with.
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>);

    /// Whether the cursor refers to an entry. Always false once exhausted or
    /// closed.
    fn valid(&self) -> bool;

    /// Advance to the next entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IteratorInvalid`] when not valid, or
    /// [`StorageError::IteratorClosed`] after close.
    fn next(&mut self) -> StorageResult<()>;

    /// The current key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IteratorInvalid`] when not valid, or
    /// [`StorageError::IteratorClosed`] after close.
    fn key(&self) -> StorageResult<&[u8]>;

    /// The current value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IteratorInvalid`] when not valid, or
    /// [`StorageError::IteratorClosed`] after close.
    fn value(&self) -> StorageResult<&[u8]>;

    /// A backend fault hit during iteration, if any.
    ///
    /// A fault ends iteration early; `None` means the range was exhausted
    /// normally (or is still being walked).
    fn error(&self) -> Option<&StorageError>;

    /// Release cursor resources.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IteratorClosed`] if already closed.
    fn close(&mut self) -> StorageResult<()>;
}

fn hex_upper(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

// ============================================================================
// Blanket Implementations
// ============================================================================

/// Implement `Database` for `Arc<D>` so one handle can back several views.
impl<D: Database + ?Sized> Database for Arc<D> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        (**self).has(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).set_sync(key, value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn delete_sync(&self, key: &[u8]) -> StorageResult<()> {
        (**self).delete_sync(key)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        (**self).iterator(start, end)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        (**self).reverse_iterator(start, end)
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        (**self).new_batch()
    }

    fn stats(&self) -> Stats {
        (**self).stats()
    }

    fn print_to(&self, out: &mut dyn Write) -> StorageResult<()> {
        (**self).print_to(out)
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }

    fn close(&self) -> StorageResult<()> {
        (**self).close()
    }
}

/// Implement `Database` for `Box<D>` so registry handles work with generic
/// code.
impl<D: Database + ?Sized> Database for Box<D> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        (**self).has(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).set_sync(key, value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn delete_sync(&self, key: &[u8]) -> StorageResult<()> {
        (**self).delete_sync(key)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        (**self).iterator(start, end)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        (**self).reverse_iterator(start, end)
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        (**self).new_batch()
    }

    fn stats(&self) -> Stats {
        (**self).stats()
    }

    fn print_to(&self, out: &mut dyn Write) -> StorageResult<()> {
        (**self).print_to(out)
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }

    fn close(&self) -> StorageResult<()> {
        (**self).close()
    }
}

impl<I: DbIterator + ?Sized> DbIterator for Box<I> {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        (**self).domain()
    }

    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn next(&mut self) -> StorageResult<()> {
        (**self).next()
    }

    fn key(&self) -> StorageResult<&[u8]> {
        (**self).key()
    }

    fn value(&self) -> StorageResult<&[u8]> {
        (**self).value()
    }

    fn error(&self) -> Option<&StorageError> {
        (**self).error()
    }

    fn close(&mut self) -> StorageResult<()> {
        (**self).close()
    }
}
