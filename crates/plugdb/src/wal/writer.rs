//! Log writer implementation

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::entry::LogRecord;
use super::error::{WalError, WalResult};
use super::{Seq, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};
use crate::engine::BatchOp;

/// Operations per record when a snapshot is written during compaction.
const SNAPSHOT_CHUNK: usize = 1024;

/// Where the writer resumes after recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// Byte offset just past the last valid record
    pub end: u64,
    /// Number of valid records before `end`
    pub records: u64,
    /// Highest sequence number seen
    pub last_seq: Seq,
}

/// Append-only log writer
///
/// Frames every record with a length prefix and CRC32 checksum. `append`
/// hands the bytes to the OS; `sync` makes them durable. `rewrite` replaces
/// the whole log with a snapshot of live data.
///
/// A failed append cuts the file back to the last whole record. If even that
/// fails the writer is poisoned and refuses further appends, so no record can
/// land behind a torn one.
pub struct LogWriter {
    /// Path to the log file
    path: PathBuf,

    /// Buffered file writer
    writer: BufWriter<File>,

    /// Current file length
    position: u64,

    /// Records in the current file
    records: u64,

    /// Highest sequence number written
    last_seq: Seq,

    /// Write buffer capacity
    buffer_size: usize,

    /// The file tail is in an unknown state
    poisoned: bool,
}

impl LogWriter {
    /// Create a fresh log, replacing any existing file at `path`
    pub fn create(path: impl AsRef<Path>, buffer_size: usize) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut writer = BufWriter::with_capacity(buffer_size, file);
        Self::write_header(&mut writer)?;
        writer.get_ref().sync_all()?;

        Ok(Self {
            path,
            writer,
            position: HEADER_SIZE,
            records: 0,
            last_seq: 0,
            buffer_size,
            poisoned: false,
        })
    }

    /// Open an existing log for appending at `resume.end`
    ///
    /// Bytes past `resume.end` (a torn or corrupt tail found by recovery) are
    /// cut off before the first append.
    pub fn resume(
        path: impl AsRef<Path>,
        buffer_size: usize,
        resume: ResumePoint,
    ) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let len = file.metadata()?.len();
        if len > resume.end {
            debug!(path = %path.display(), from = len, to = resume.end, "truncating log tail");
            file.set_len(resume.end)?;
            file.sync_all()?;
        }

        let mut writer = BufWriter::with_capacity(buffer_size, file);
        writer.seek(SeekFrom::Start(resume.end))?;

        Ok(Self {
            path,
            writer,
            position: resume.end,
            records: resume.records,
            last_seq: resume.last_seq,
            buffer_size,
            poisoned: false,
        })
    }

    /// Write the log file header
    fn write_header(writer: &mut BufWriter<File>) -> WalResult<()> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&LOG_MAGIC)?;
        writer.write_all(&LOG_VERSION.to_le_bytes())?;
        writer.write_all(&[0u8; 4])?; // Reserved
        writer.flush()?;
        Ok(())
    }

    /// Append a record and hand it to the OS
    ///
    /// Returns the number of bytes written. The record is not durable until
    /// [`LogWriter::sync`].
    pub fn append(&mut self, record: &LogRecord) -> WalResult<u64> {
        self.ensure_usable()?;
        if record.seq <= self.last_seq {
            return Err(WalError::InvalidSequence { attempted: record.seq, current: self.last_seq });
        }

        let frame = record.encode_frame()?;
        let mark = self.mark();
        if let Err(e) = self.write_frame(&frame) {
            // Drop the partial frame; a poisoned writer keeps the original error.
            let _ = self.rollback(mark);
            return Err(e);
        }

        let written = frame.len() as u64;
        self.position += written;
        self.records += 1;
        self.last_seq = record.seq;
        Ok(written)
    }

    fn write_frame(&mut self, frame: &[u8]) -> WalResult<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Sync written records to disk
    pub fn sync(&mut self) -> WalResult<()> {
        self.ensure_usable()?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// The current end of the log, for a later [`LogWriter::rollback`]
    pub fn mark(&self) -> ResumePoint {
        ResumePoint { end: self.position, records: self.records, last_seq: self.last_seq }
    }

    /// Cut the log back to `mark`, discarding every record written after it
    ///
    /// Bytes still sitting in the write buffer are thrown away, not flushed.
    /// If the cut fails the writer is poisoned.
    pub fn rollback(&mut self, mark: ResumePoint) -> WalResult<()> {
        match self.truncate_to(mark.end) {
            Ok(()) => {
                self.position = mark.end;
                self.records = mark.records;
                self.last_seq = mark.last_seq;
                Ok(())
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    end = mark.end,
                    error = %e,
                    "log rollback failed, writer poisoned"
                );
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn truncate_to(&mut self, end: u64) -> WalResult<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale =
            std::mem::replace(&mut self.writer, BufWriter::with_capacity(self.buffer_size, file));
        let (_file, _unwritten) = stale.into_parts();

        let file = self.writer.get_ref();
        file.set_len(end)?;
        file.sync_data()?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    fn ensure_usable(&self) -> WalResult<()> {
        if self.poisoned {
            return Err(WalError::Poisoned(self.path.display().to_string()));
        }
        Ok(())
    }

    /// Whether a failed rollback left the writer unusable
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Replace the log with a snapshot of live data
    ///
    /// The snapshot is written to `<path>.tmp`, synced, then renamed over the
    /// log, so a crash at any point leaves either the old or the new log.
    /// Sequence numbers keep increasing across the rewrite. The snapshot is a
    /// fresh file, so a successful rewrite also clears a poisoned writer.
    pub fn rewrite(&mut self, live: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>) -> WalResult<()> {
        let temp_path = temp_path(&self.path);
        let mut temp = Self::create(&temp_path, self.buffer_size)?;
        temp.last_seq = self.last_seq;

        let mut chunk = Vec::with_capacity(SNAPSHOT_CHUNK);
        for (key, value) in live {
            chunk.push(BatchOp::Set { key, value });
            if chunk.len() == SNAPSHOT_CHUNK {
                let seq = temp.next_seq();
                temp.append(&LogRecord::batch(seq, std::mem::take(&mut chunk)))?;
            }
        }
        if !chunk.is_empty() {
            let seq = temp.next_seq();
            temp.append(&LogRecord::batch(seq, chunk))?;
        }
        temp.sync()?;

        let Self { writer, position, records, last_seq, .. } = temp;

        // Atomic rename
        std::fs::rename(&temp_path, &self.path)?;

        // The snapshot is the log from here on, even if the directory sync fails.
        self.writer = writer;
        self.position = position;
        self.records = records;
        self.last_seq = last_seq;
        self.poisoned = false;
        sync_parent_dir(&self.path)
    }

    /// Current file length in bytes
    pub fn bytes(&self) -> u64 {
        self.position
    }

    /// Records in the current file
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Highest sequence number written
    pub fn last_seq(&self) -> Seq {
        self.last_seq
    }

    /// Next sequence number to use
    pub fn next_seq(&self) -> Seq {
        self.last_seq + 1
    }

    /// Path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Scratch path used while rewriting the log at `path`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// Lock file guarding exclusive use of the log at `path`
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    with_suffix(path, ".lock")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> WalResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> WalResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_writer_create() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.logdb");

        let log = LogWriter::create(&log_path, 4096).unwrap();

        assert_eq!(log.last_seq(), 0);
        assert_eq!(log.bytes(), HEADER_SIZE);
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), HEADER_SIZE);
    }

    #[test]
    fn test_log_writer_append() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.logdb");
        let mut log = LogWriter::create(&log_path, 4096).unwrap();

        let n1 = log.append(&LogRecord::set(1, b"k1", b"v1")).unwrap();
        let n2 = log.append(&LogRecord::delete(2, b"k1")).unwrap();

        assert_eq!(log.records(), 2);
        assert_eq!(log.last_seq(), 2);
        assert_eq!(log.bytes(), HEADER_SIZE + n1 + n2);
        // append flushes to the OS, so the file already has every byte
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), log.bytes());
    }

    #[test]
    fn test_log_writer_invalid_sequence() {
        let dir = tempdir().unwrap();
        let mut log = LogWriter::create(dir.path().join("test.logdb"), 4096).unwrap();

        log.append(&LogRecord::set(5, b"k", b"v")).unwrap();

        let result = log.append(&LogRecord::set(3, b"k", b"v"));
        assert!(matches!(result, Err(WalError::InvalidSequence { attempted: 3, current: 5 })));
    }

    #[test]
    fn test_resume_cuts_tail() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.logdb");
        let end = {
            let mut log = LogWriter::create(&log_path, 4096).unwrap();
            log.append(&LogRecord::set(1, b"k", b"v")).unwrap();
            log.sync().unwrap();
            log.bytes()
        };
        {
            let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
            file.write_all(b"torn").unwrap();
        }

        let resume = ResumePoint { end, records: 1, last_seq: 1 };
        let log = LogWriter::resume(&log_path, 4096, resume).unwrap();

        assert_eq!(log.next_seq(), 2);
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), end);
    }

    #[test]
    fn test_rewrite_replaces_history() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.logdb");
        let mut log = LogWriter::create(&log_path, 4096).unwrap();
        for seq in 1..=50u64 {
            log.append(&LogRecord::set(seq, b"same-key", &seq.to_le_bytes())).unwrap();
        }
        let before = log.bytes();

        log.rewrite(vec![(b"same-key".to_vec(), 50u64.to_le_bytes().to_vec())]).unwrap();

        assert!(log.bytes() < before);
        assert_eq!(log.records(), 1);
        assert_eq!(log.last_seq(), 51);
        assert!(!temp_path(&log_path).exists());

        // still appendable after the swap
        log.append(&LogRecord::delete(52, b"same-key")).unwrap();
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), log.bytes());
    }

    #[test]
    fn test_rollback_discards_later_records() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.logdb");
        let mut log = LogWriter::create(&log_path, 4096).unwrap();
        log.append(&LogRecord::set(1, b"a", b"1")).unwrap();
        log.append(&LogRecord::set(2, b"b", b"2")).unwrap();
        let mark = log.mark();

        log.append(&LogRecord::set(3, b"c", b"3")).unwrap();
        // Half a frame still in the buffer, as left by a failed write
        log.writer.write_all(&[64, 0, 0, 0, 1, 2]).unwrap();

        log.rollback(mark).unwrap();
        assert_eq!(log.mark(), mark);
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), mark.end);
        assert!(!log.is_poisoned());

        log.append(&LogRecord::set(3, b"d", b"4")).unwrap();
        log.sync().unwrap();

        let mut keys = Vec::new();
        let stats = crate::wal::replay(&log_path, crate::wal::RecoveryMode::Strict, |record| {
            for op in record.ops {
                if let BatchOp::Set { key, .. } = op {
                    keys.push(key);
                }
            }
        })
        .unwrap();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]);
        assert_eq!(stats.last_seq, 3);
        assert_eq!(stats.discarded_bytes, 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_poisons_writer() {
        // Writes to /dev/full fail with ENOSPC and the device cannot be truncated
        let Ok(file) = OpenOptions::new().write(true).open("/dev/full") else {
            return;
        };
        let mut log = LogWriter {
            path: PathBuf::from("/dev/full"),
            writer: BufWriter::with_capacity(4096, file),
            position: HEADER_SIZE,
            records: 0,
            last_seq: 0,
            buffer_size: 4096,
            poisoned: false,
        };

        let result = log.append(&LogRecord::set(1, b"k", b"v"));
        assert!(matches!(result, Err(WalError::Io(_))));
        assert!(log.is_poisoned());
        assert_eq!(log.bytes(), HEADER_SIZE);
        assert_eq!(log.last_seq(), 0);

        assert!(matches!(log.append(&LogRecord::set(1, b"k", b"v")), Err(WalError::Poisoned(_))));
        assert!(matches!(log.sync(), Err(WalError::Poisoned(_))));
    }
}
