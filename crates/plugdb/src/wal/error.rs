//! Log error types and result aliases

use std::io;

use crate::engine::StorageError;

/// Result type alias for log operations
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur while reading or writing the log
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// I/O error during file operations
    #[error("log I/O error: {0}")]
    Io(#[from] io::Error),

    /// Checksum mismatch - data corruption detected
    #[error("log checksum mismatch at offset {offset}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Byte offset of the damaged record
        offset: u64,
        /// Stored checksum value
        expected: u32,
        /// Computed checksum value
        actual: u32,
    },

    /// Record deserialization failed
    #[error("log record deserialization failed: {0}")]
    Deserialize(String),

    /// Record serialization failed
    #[error("log record serialization failed: {0}")]
    Serialize(String),

    /// Invalid log file format or magic number
    #[error("invalid log file format: {0}")]
    InvalidFormat(String),

    /// Log file ends in the middle of a record
    #[error("log file truncated at offset {offset}")]
    Truncated {
        /// Byte offset where the incomplete record starts
        offset: u64,
    },

    /// Attempted to write a sequence number that is not increasing
    #[error("sequence {attempted} is not greater than current sequence {current}")]
    InvalidSequence {
        /// The sequence number that was attempted
        attempted: u64,
        /// The current highest sequence number
        current: u64,
    },

    /// Recovery refused to continue
    #[error("log recovery failed: {0}")]
    Recovery(String),

    /// An earlier write failure left the log tail unrecoverable
    #[error("log writer poisoned by an earlier failed write: {0}")]
    Poisoned(String),
}

impl WalError {
    /// Returns true if this error indicates damaged log contents
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::Truncated { .. }
                | Self::InvalidFormat(_)
                | Self::Deserialize(_)
                | Self::InvalidSequence { .. }
        )
    }
}

impl From<WalError> for StorageError {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Io(e) => Self::Io(e),
            e if e.is_corruption() => Self::Corruption(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_category() {
        let io = WalError::Io(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(matches!(StorageError::from(io), StorageError::Io(_)));

        let torn = WalError::Truncated { offset: 42 };
        assert!(StorageError::from(torn).is_corruption());

        let ser = WalError::Serialize("boom".into());
        assert!(matches!(StorageError::from(ser), StorageError::Internal(_)));
    }
}
