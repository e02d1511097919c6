//! Log record types and framing

use serde::{Deserialize, Serialize};

use super::error::{WalError, WalResult};
use super::Seq;
use crate::engine::BatchOp;

/// Bytes of framing around every record: length prefix plus CRC32 trailer.
pub(crate) const FRAME_OVERHEAD: u64 = 8;

/// A single record in the log
///
/// One record holds every operation of one write: a lone `set`/`delete` or a
/// whole batch. Records are framed and checksummed as a unit, so a batch is
/// either replayed completely or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Sequence number - strictly increasing within a log file
    pub seq: Seq,

    /// Operations, applied in order
    pub ops: Vec<BatchOp>,
}

impl LogRecord {
    /// Create a record holding a single upsert
    pub fn set(seq: Seq, key: &[u8], value: &[u8]) -> Self {
        Self { seq, ops: vec![BatchOp::Set { key: key.to_vec(), value: value.to_vec() }] }
    }

    /// Create a record holding a single delete
    pub fn delete(seq: Seq, key: &[u8]) -> Self {
        Self { seq, ops: vec![BatchOp::Delete { key: key.to_vec() }] }
    }

    /// Create a record from a batch of operations
    pub fn batch(seq: Seq, ops: Vec<BatchOp>) -> Self {
        Self { seq, ops }
    }

    /// Serialize into an on-disk frame: `[len: u32 LE][payload][crc32: u32 LE]`
    pub fn encode_frame(&self) -> WalResult<Vec<u8>> {
        let data = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| WalError::Serialize(e.to_string()))?;
        let len = u32::try_from(data.len())
            .map_err(|_| WalError::Serialize(format!("record too large: {} bytes", data.len())))?;

        let mut frame = Vec::with_capacity(data.len() + FRAME_OVERHEAD as usize);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        Ok(frame)
    }

    /// Deserialize a record payload (the bytes between length and checksum)
    pub fn decode(data: &[u8]) -> WalResult<Self> {
        let (record, read): (Self, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard())
                .map_err(|e| WalError::Deserialize(e.to_string()))?;
        if read != data.len() {
            return Err(WalError::Deserialize(format!(
                "{} trailing bytes after record",
                data.len() - read
            )));
        }
        Ok(record)
    }
}
