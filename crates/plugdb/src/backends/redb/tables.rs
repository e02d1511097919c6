//! Redb table definition and error mapping.
//!
//! Every entry lives in one physical table; keys and values are stored as
//! raw bytes, so redb's own key order is the byte order callers expect.

use redb::TableDefinition;

use crate::engine::StorageError;

/// The physical table that stores all key-value pairs.
pub const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> = TableDefinition::new("plugdb_data");

/// Map any redb failure onto [`StorageError`], keeping I/O and corruption
/// distinguishable from other faults.
pub(crate) fn storage_err(err: impl Into<redb::Error>) -> StorageError {
    match err.into() {
        redb::Error::Io(e) => StorageError::Io(e),
        redb::Error::Corrupted(msg) => StorageError::Corruption(msg),
        other => StorageError::Internal(other.to_string()),
    }
}
