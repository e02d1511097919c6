//! Log recovery and replay functionality

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use tracing::{info, warn};

use super::entry::{LogRecord, FRAME_OVERHEAD};
use super::error::{WalError, WalResult};
use super::writer::ResumePoint;
use super::{Seq, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};

/// Log reader
///
/// Reads and validates records sequentially from the start of a log file.
pub struct LogReader {
    /// Buffered file reader
    reader: BufReader<File>,

    /// Offset just past the last record read
    position: u64,

    /// File size at open
    file_size: u64,
}

impl LogReader {
    /// Open a log file and validate its header
    ///
    /// A file shorter than the header is reported as
    /// [`WalError::Truncated`] at offset 0.
    pub fn open(path: impl AsRef<Path>) -> WalResult<Self> {
        let file = File::open(path.as_ref())?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE {
            return Err(WalError::Truncated { offset: 0 });
        }

        let mut reader = BufReader::new(file);
        Self::validate_header(&mut reader)?;

        Ok(Self { reader, position: HEADER_SIZE, file_size })
    }

    /// Validate the log file header
    fn validate_header(reader: &mut BufReader<File>) -> WalResult<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;

        if header[0..8] != LOG_MAGIC {
            return Err(WalError::InvalidFormat(format!(
                "invalid magic number: {:?}",
                &header[0..8]
            )));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version_bytes);
        if version != LOG_VERSION {
            return Err(WalError::InvalidFormat(format!(
                "unsupported log version: {version}, expected {LOG_VERSION}"
            )));
        }

        Ok(())
    }

    /// Offset just past the last record read successfully
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record, `None` at a clean end of file
    pub fn read_record(&mut self) -> WalResult<Option<LogRecord>> {
        if self.position >= self.file_size {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes);
        if len == 0 {
            return Err(WalError::InvalidFormat(format!(
                "zero-length record at offset {}",
                self.position
            )));
        }
        if self.position + u64::from(len) + FRAME_OVERHEAD > self.file_size {
            return Err(WalError::Truncated { offset: self.position });
        }

        let mut data = vec![0u8; len as usize];
        self.read_exact(&mut data)?;

        let mut crc_bytes = [0u8; 4];
        self.read_exact(&mut crc_bytes)?;
        let stored_crc = u32::from_le_bytes(crc_bytes);
        let computed_crc = crc32fast::hash(&data);

        if stored_crc != computed_crc {
            return Err(WalError::ChecksumMismatch {
                offset: self.position,
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let record = LogRecord::decode(&data)?;
        self.position += u64::from(len) + FRAME_OVERHEAD;
        Ok(Some(record))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> WalResult<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(WalError::Truncated { offset: self.position })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create an iterator over all records in the log
    pub fn iter(self) -> RecordIterator {
        RecordIterator { reader: self, finished: false }
    }
}

/// Recovery mode determines how a damaged tail is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Keep every record before the damage and discard the rest (default)
    #[default]
    TruncateTail,

    /// Fail if any damage is detected
    Strict,
}

/// Statistics from log recovery
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records replayed
    pub records_applied: u64,

    /// Operations inside the replayed records
    pub operations_applied: u64,

    /// Highest sequence number replayed
    pub last_seq: Seq,

    /// Offset just past the last valid record
    pub valid_bytes: u64,

    /// Bytes after the last valid record
    pub discarded_bytes: u64,

    /// Description of the damage that ended replay, if any
    pub damage: Option<String>,
}

impl RecoveryStats {
    /// Returns true if a damaged tail was found
    pub const fn has_corruption(&self) -> bool {
        self.damage.is_some()
    }

    /// Where a writer should resume appending
    pub const fn resume_point(&self) -> ResumePoint {
        ResumePoint {
            end: self.valid_bytes,
            records: self.records_applied,
            last_seq: self.last_seq,
        }
    }
}

/// Replay every valid record of the log at `path`, in order
///
/// Replay stops at the first damaged record: a torn write, a checksum
/// mismatch, an undecodable payload or a sequence number that does not
/// increase. Under [`RecoveryMode::TruncateTail`] everything from that point
/// on is reported as discarded; under [`RecoveryMode::Strict`] replay fails
/// with [`WalError::Recovery`] instead. `apply` only ever sees whole records.
pub fn replay<F>(path: impl AsRef<Path>, mode: RecoveryMode, mut apply: F) -> WalResult<RecoveryStats>
where
    F: FnMut(LogRecord),
{
    let path = path.as_ref();
    let mut reader = LogReader::open(path)?;
    let file_size = reader.file_size;
    let mut stats = RecoveryStats::default();

    loop {
        let record = match reader.read_record() {
            Ok(Some(record)) if record.seq > stats.last_seq => record,
            Ok(Some(record)) => {
                let err = WalError::InvalidSequence { attempted: record.seq, current: stats.last_seq };
                stats.damage = Some(err.to_string());
                break;
            }
            Ok(None) => break,
            Err(e) if e.is_corruption() => {
                stats.damage = Some(e.to_string());
                break;
            }
            Err(e) => return Err(e),
        };

        stats.records_applied += 1;
        stats.operations_applied += record.ops.len() as u64;
        stats.last_seq = record.seq;
        apply(record);
    }

    // A rejected record never advances the reader past its own start.
    stats.valid_bytes = reader.position();
    stats.discarded_bytes = file_size - stats.valid_bytes;

    if let Some(damage) = &stats.damage {
        if mode == RecoveryMode::Strict {
            return Err(WalError::Recovery(format!(
                "{damage} ({} bytes after offset {})",
                stats.discarded_bytes, stats.valid_bytes
            )));
        }
        warn!(
            path = %path.display(),
            records_applied = stats.records_applied,
            discarded_bytes = stats.discarded_bytes,
            damage = %damage,
            "log recovery discarded a damaged tail"
        );
    } else {
        info!(
            path = %path.display(),
            records_applied = stats.records_applied,
            operations_applied = stats.operations_applied,
            last_seq = stats.last_seq,
            "log recovery completed"
        );
    }

    Ok(stats)
}

/// Iterator over log records
///
/// Yields each record in order; the first error is yielded once and ends
/// iteration.
pub struct RecordIterator {
    reader: LogReader,
    finished: bool,
}

impl Iterator for RecordIterator {
    type Item = WalResult<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
