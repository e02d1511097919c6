//! Streaming iterator over a redb read transaction.
//!
//! The iterator keeps the read transaction's table open, so it sees one MVCC
//! snapshot for its whole life. Instead of materialising the range upfront it
//! loads entries in batches (default 1000), fetching the next batch when the
//! cursor runs off the end of the current one.

use std::ops::Bound;

use redb::{AccessGuard, ReadOnlyTable};

use crate::engine::range::to_bounds;
use crate::engine::{DbIterator, Direction, KeyRange, KeyValue, StorageError, StorageResult};

use super::tables::storage_err;

/// Default batch size for iterator fetches.
/// This limits memory usage while maintaining good performance.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

type DataTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

/// An ordered cursor over one redb snapshot.
pub struct RedbIterator {
    /// Open table of the read transaction; `None` once closed.
    table: Option<DataTable>,
    range: KeyRange,
    direction: Direction,
    batch: Vec<KeyValue>,
    position: usize,
    /// No entries remain beyond the current batch.
    exhausted: bool,
    batch_size: usize,
    error: Option<StorageError>,
}

impl RedbIterator {
    /// Create an iterator positioned at the first entry of `range`.
    pub(crate) fn new(
        table: DataTable,
        range: KeyRange,
        direction: Direction,
        batch_size: usize,
    ) -> StorageResult<Self> {
        let mut iter = Self {
            table: Some(table),
            range,
            direction,
            batch: Vec::new(),
            position: 0,
            exhausted: false,
            batch_size: batch_size.max(1),
            error: None,
        };

        if matches!(iter.range.domain(), (Some(s), Some(e)) if s == e) {
            iter.exhausted = true;
        } else {
            iter.load_batch(None)?;
        }
        Ok(iter)
    }

    /// Replace the current batch with the entries following `resume`.
    fn load_batch(&mut self, resume: Option<&[u8]>) -> StorageResult<()> {
        let batch = self.fetch_batch(resume)?;
        self.exhausted = batch.len() < self.batch_size;
        self.batch = batch;
        self.position = 0;
        Ok(())
    }

    fn fetch_batch(&self, resume: Option<&[u8]>) -> StorageResult<Vec<KeyValue>> {
        let table = self.table.as_ref().ok_or(StorageError::IteratorClosed)?;
        let (lower, upper) = to_bounds(self.range.start.as_deref(), self.range.end.as_deref());

        // Nothing lies past a resume key at the far edge of the range.
        let past_edge = match (self.direction, resume) {
            (Direction::Forward, Some(key)) => self.range.end.as_deref().is_some_and(|e| key >= e),
            (Direction::Reverse, Some(key)) => {
                self.range.start.as_deref().is_some_and(|s| key <= s)
            }
            (_, None) => false,
        };
        if past_edge {
            return Ok(Vec::new());
        }

        // Continue strictly past the last key handed out.
        let bounds = match (self.direction, resume) {
            (_, None) => (lower, upper),
            (Direction::Forward, Some(key)) => (Bound::Excluded(key), upper),
            (Direction::Reverse, Some(key)) => (lower, Bound::Excluded(key)),
        };

        let range = table.range::<&[u8]>(bounds).map_err(storage_err)?;
        match self.direction {
            Direction::Forward => take_batch(range, self.batch_size),
            Direction::Reverse => take_batch(range.rev(), self.batch_size),
        }
    }

    fn current(&self) -> StorageResult<&KeyValue> {
        if self.table.is_none() {
            return Err(StorageError::IteratorClosed);
        }
        self.batch.get(self.position).ok_or(StorageError::IteratorInvalid)
    }
}

fn take_batch<'a, I>(entries: I, limit: usize) -> StorageResult<Vec<KeyValue>>
where
    I: Iterator<
        Item = Result<
            (AccessGuard<'a, &'static [u8]>, AccessGuard<'a, &'static [u8]>),
            redb::StorageError,
        >,
    >,
{
    let mut batch = Vec::with_capacity(limit.min(1024));
    for entry in entries.take(limit) {
        let (k, v) = entry.map_err(storage_err)?;
        batch.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(batch)
}

impl DbIterator for RedbIterator {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        self.range.domain()
    }

    fn valid(&self) -> bool {
        self.table.is_some() && self.position < self.batch.len()
    }

    fn next(&mut self) -> StorageResult<()> {
        self.current()?;
        self.position += 1;

        if self.position == self.batch.len() && !self.exhausted {
            let resume = self.batch.last().map(|(k, _)| k.clone());
            if let Err(e) = self.load_batch(resume.as_deref()) {
                // A fault ends the scan; callers see it through `error()`.
                self.batch.clear();
                self.position = 0;
                self.exhausted = true;
                self.error = Some(e);
            }
        }
        Ok(())
    }

    fn key(&self) -> StorageResult<&[u8]> {
        self.current().map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> StorageResult<&[u8]> {
        self.current().map(|(_, v)| v.as_slice())
    }

    fn error(&self) -> Option<&StorageError> {
        self.error.as_ref()
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.table.take().is_none() {
            return Err(StorageError::IteratorClosed);
        }
        self.batch = Vec::new();
        Ok(())
    }
}
