//! Shared iterator building blocks.
//!
//! - [`SnapshotIterator`] walks entries copied out of an engine when the
//!   iterator was created, so later writes never disturb it.
//! - [`Entries`] adapts any [`DbIterator`] to a standard [`Iterator`].

use super::range::KeyRange;
use super::{DbIterator, KeyValue, StorageError, StorageResult};

/// Iteration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Reverse,
}

/// An iterator over a materialised copy of a key range.
///
/// Engines collect the range under their read lock, then release it; the
/// iterator then owns its entries outright.
#[derive(Debug)]
pub struct SnapshotIterator {
    range: KeyRange,
    entries: Vec<KeyValue>,
    position: usize,
    closed: bool,
}

impl SnapshotIterator {
    /// Build an iterator from entries sorted ascending.
    ///
    /// For [`Direction::Reverse`] the entries are walked back to front.
    pub fn new(range: KeyRange, mut entries: Vec<KeyValue>, direction: Direction) -> Self {
        if direction == Direction::Reverse {
            entries.reverse();
        }
        Self { range, entries, position: 0, closed: false }
    }

    /// An iterator that is exhausted from the start.
    pub fn empty(range: KeyRange) -> Self {
        Self::new(range, Vec::new(), Direction::Forward)
    }

    fn current(&self) -> StorageResult<&KeyValue> {
        if self.closed {
            return Err(StorageError::IteratorClosed);
        }
        self.entries.get(self.position).ok_or(StorageError::IteratorInvalid)
    }
}

impl DbIterator for SnapshotIterator {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        self.range.domain()
    }

    fn valid(&self) -> bool {
        !self.closed && self.position < self.entries.len()
    }

    fn next(&mut self) -> StorageResult<()> {
        self.current()?;
        self.position += 1;
        Ok(())
    }

    fn key(&self) -> StorageResult<&[u8]> {
        self.current().map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> StorageResult<&[u8]> {
        self.current().map(|(_, v)| v.as_slice())
    }

    fn error(&self) -> Option<&StorageError> {
        None
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::IteratorClosed);
        }
        self.closed = true;
        self.entries = Vec::new();
        Ok(())
    }
}

/// A standard [`Iterator`] over the entries of a [`DbIterator`].
///
/// Yields owned pairs until the range is exhausted. A backend fault is
/// yielded once as an `Err`, after which the adapter stops.
pub struct Entries<I> {
    iter: I,
    advance: bool,
    done: bool,
}

impl<I: DbIterator> Entries<I> {
    /// Wrap a freshly created iterator.
    pub const fn new(iter: I) -> Self {
        Self { iter, advance: false, done: false }
    }

    /// Recover the wrapped iterator, e.g. to close it explicitly.
    pub fn into_inner(self) -> I {
        self.iter
    }
}

impl<I: DbIterator> Iterator for Entries<I> {
    type Item = StorageResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.advance {
            if let Err(e) = self.iter.next() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.advance = true;

        if !self.iter.valid() {
            self.done = true;
            return self.iter.error().map(|e| Err(StorageError::Internal(e.to_string())));
        }

        let entry = self
            .iter
            .key()
            .and_then(|k| self.iter.value().map(|v| (k.to_vec(), v.to_vec())));
        if entry.is_err() {
            self.done = true;
        }
        Some(entry)
    }
}

/// Collect every entry of `iter` into a vector, then close it.
///
/// # Errors
///
/// Returns the first error raised while walking or closing the iterator.
pub fn collect_entries<I: DbIterator>(iter: I) -> StorageResult<Vec<KeyValue>> {
    let mut entries = Entries::new(iter);
    let collected = entries.by_ref().collect::<StorageResult<Vec<_>>>()?;
    entries.into_inner().close()?;
    Ok(collected)
}
