//! Key ordering and range bounds.
//!
//! Keys compare lexicographically as unsigned bytes, which is exactly the
//! `Ord` implementation of `[u8]`. A range is half-open: `start` is inclusive,
//! `end` is exclusive, and a missing endpoint leaves that side unbounded.

use std::ops::Bound;

use super::{StorageError, StorageResult};

/// An owned `[start, end)` key range with optional endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound, `None` for the lowest key.
    pub start: Option<Vec<u8>>,
    /// Exclusive upper bound, `None` for past the highest key.
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    /// Build a range, rejecting `start > end`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] when both endpoints are
    /// present and `start` sorts after `end`.
    pub fn new(start: Option<&[u8]>, end: Option<&[u8]>) -> StorageResult<Self> {
        check_bounds(start, end)?;
        Ok(Self { start: start.map(<[u8]>::to_vec), end: end.map(<[u8]>::to_vec) })
    }

    /// The whole keyspace.
    pub const fn full() -> Self {
        Self { start: None, end: None }
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        contains(self.start.as_deref(), self.end.as_deref(), key)
    }

    /// Borrowed endpoints, in the shape returned by `DbIterator::domain`.
    pub fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        (self.start.as_deref(), self.end.as_deref())
    }

    /// The range as a pair of [`Bound`]s, usable with `BTreeMap::range`.
    pub fn as_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        to_bounds(self.start.as_deref(), self.end.as_deref())
    }
}

/// Reject ranges whose start sorts after their end.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] for an inverted range.
pub fn check_bounds(start: Option<&[u8]>, end: Option<&[u8]>) -> StorageResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(StorageError::InvalidArgument(format!(
            "range start {s:02X?} is greater than end {e:02X?}"
        ))),
        _ => Ok(()),
    }
}

/// Whether `key` lies in `[start, end)`.
pub fn contains(start: Option<&[u8]>, end: Option<&[u8]>, key: &[u8]) -> bool {
    start.map_or(true, |s| key >= s) && end.map_or(true, |e| key < e)
}

/// Convert optional endpoints into `[start, end)` bounds.
pub fn to_bounds<'a>(
    start: Option<&'a [u8]>,
    end: Option<&'a [u8]>,
) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
    let lower = start.map_or(Bound::Unbounded, Bound::Included);
    let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
    (lower, upper)
}

/// The smallest key greater than every key that starts with `prefix`.
///
/// Returns `None` when no such key exists, i.e. the prefix is empty or made
/// only of `0xFF` bytes; the prefix range is then open-ended.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
