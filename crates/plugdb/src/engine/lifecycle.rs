//! Open/closed state shared by every backend.

use std::sync::atomic::{AtomicBool, Ordering};

use super::{StorageError, StorageResult};

/// Tracks the one-way `Open -> Closed` transition of a database handle.
#[derive(Debug, Default)]
pub struct Lifecycle {
    closed: AtomicBool,
}

impl Lifecycle {
    /// A handle in the open state.
    pub const fn new() -> Self {
        Self { closed: AtomicBool::new(false) }
    }

    /// Fail with [`StorageError::AlreadyClosed`] unless still open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] once closed.
    pub fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    /// Move to the closed state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] if another call already closed
    /// the handle.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            Err(StorageError::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
