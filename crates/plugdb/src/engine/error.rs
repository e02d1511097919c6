//! Storage error types.

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed error carried by [`StorageError::BackendOpen`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in storage operations.
///
/// Every backend reports failures through this type, so callers never have to
/// know which engine sits behind a [`Database`](super::Database).
#[derive(Debug, Error)]
pub enum StorageError {
    /// An argument was rejected before reaching the backend.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No constructor is registered under the requested backend name.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// The backend failed while opening or creating the store.
    #[error("failed to open {backend} database: {source}")]
    BackendOpen {
        /// Name of the backend that failed.
        backend: String,
        /// The underlying cause.
        #[source]
        source: BoxError,
    },

    /// The database was used after `close()`.
    #[error("database is already closed")]
    AlreadyClosed,

    /// `key()` / `value()` / `next()` was called on an exhausted iterator.
    #[error("iterator is not positioned at a valid entry")]
    IteratorInvalid,

    /// The iterator was used after `close()`.
    #[error("iterator is closed")]
    IteratorClosed,

    /// The batch was used after `write()`, `write_sync()` or `close()`.
    #[error("batch is closed")]
    BatchClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data failed validation.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// A backend-internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Wrap a backend-specific failure raised while opening a store.
    pub fn open(backend: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::BackendOpen { backend: backend.into(), source: source.into() }
    }

    /// Returns true for any use-after-close error.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed | Self::IteratorClosed | Self::BatchClosed)
    }

    /// Returns true if the caller passed an invalid argument.
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns true if the error reflects damaged persisted data.
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }

    /// Convert a poisoned lock into an internal error.
    pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> Self {
        Self::Internal("lock poisoned".into())
    }
}
