//! Log-structured storage backend.
//!
//! [`LogDb`] serves reads from an in-memory ordered table and makes writes
//! durable through the append-only log in [`crate::wal`]. Opening a store
//! replays its log; when the log grows much larger than the live data it is
//! rewritten as a compact snapshot.
//!
//! A store holds an exclusive lock on `<path>.lock` from open until close, so
//! a second handle on the same log fails to open instead of interleaving
//! records with the first.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use tracing::{debug, info, warn};

use super::memdb::{apply_ops, payload_bytes, MemDb, Table};
use crate::engine::{
    Batch, BatchOp, BatchTarget, BufferedBatch, Database, DbIterator, Direction, Lifecycle, Stats,
    StorageError, StorageResult,
};
use crate::wal::{self, LogRecord, LogWriter, RecoveryMode, WalError};

const BACKEND: &str = "logdb";

/// Smallest growth factor between compactions. Below 2 a fresh snapshot can
/// already be over the threshold.
const MIN_COMPACTION_RATIO: u64 = 2;

/// Configuration options for the log-structured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogDbConfig {
    /// Write buffer size for the log file in bytes.
    pub buffer_size: usize,

    /// Never compact a log smaller than this many bytes.
    pub compaction_min_bytes: u64,

    /// Compact once the log is this many times larger than both the live data
    /// and the snapshot written by the previous compaction. At least 2.
    pub compaction_ratio: u64,

    /// Refuse to open a log with a damaged tail instead of discarding it.
    pub strict_recovery: bool,
}

impl Default for LogDbConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,                // 64KB
            compaction_min_bytes: 4 * 1024 * 1024, // 4MB
            compaction_ratio: 4,
            strict_recovery: false,
        }
    }
}

impl LogDbConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log write buffer size.
    #[must_use]
    pub const fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the minimum log size before compaction is considered.
    #[must_use]
    pub const fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.compaction_min_bytes = bytes;
        self
    }

    /// Set how many times larger than the live data the log may grow.
    ///
    /// Values below 2 are raised to 2.
    #[must_use]
    pub const fn compaction_ratio(mut self, ratio: u64) -> Self {
        self.compaction_ratio =
            if ratio < MIN_COMPACTION_RATIO { MIN_COMPACTION_RATIO } else { ratio };
        self
    }

    /// Fail to open when the log tail is damaged.
    #[must_use]
    pub const fn strict_recovery(mut self, strict: bool) -> Self {
        self.strict_recovery = strict;
        self
    }
}

/// Writer-side state, guarded by one mutex so records hit the log in the
/// same order they are applied to the table.
struct LogState {
    writer: Option<LogWriter>,
    /// Held locked until close.
    lock: Option<File>,
    live_bytes: u64,
    /// Log size right after the last compaction; 0 before the first.
    compacted_bytes: u64,
    compactions: u64,
}

/// A storage backend backed by an in-memory table and a write-ahead log.
///
/// Every write becomes one log record (a whole batch included) before it is
/// applied to the table. Writers serialise on the log; readers only touch
/// the table, so they never wait on log I/O.
///
/// # Example
///
/// ```ignore
/// use plugdb::backends::{LogDb, LogDbConfig};
/// use plugdb::Database;
///
/// let config = LogDbConfig::new().strict_recovery(true);
/// let db = LogDb::open_with_config("data/state.logdb", config)?;
/// db.set_sync(b"height", b"42")?;
/// db.close()?;
/// ```
pub struct LogDb {
    path: PathBuf,
    table: MemDb,
    log: Mutex<LogState>,
    config: LogDbConfig,
    state: Lifecycle,
}

impl LogDb {
    /// Open or create a store at `path` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackendOpen`] if the log cannot be created or
    /// replayed, or if another handle already has it open.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, LogDbConfig::default())
    }

    /// Open or create a store at `path` with custom configuration.
    ///
    /// An existing log is replayed. A torn or corrupt tail is cut off, or
    /// rejected when [`LogDbConfig::strict_recovery`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackendOpen`] if the log cannot be created or
    /// replayed, or if another handle already has it open.
    pub fn open_with_config(path: impl AsRef<Path>, config: LogDbConfig) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = acquire_lock(&path).map_err(|e| StorageError::open(BACKEND, e))?;

        // Left behind by a compaction that never reached its rename.
        let stale = wal::temp_path(&path);
        if stale.exists() {
            warn!(path = %stale.display(), "removing unfinished log rewrite");
            std::fs::remove_file(&stale).map_err(|e| StorageError::open(BACKEND, e))?;
        }

        let mut table = Table::new();
        let writer = Self::recover(&path, &config, &mut table)
            .map_err(|e| StorageError::open(BACKEND, e))?;
        let live_bytes = payload_bytes(&table);

        debug!(
            path = %path.display(),
            entries = table.len(),
            log_bytes = writer.bytes(),
            "opened logdb"
        );

        Ok(Self {
            path,
            table: MemDb::from_table(table),
            log: Mutex::new(LogState {
                writer: Some(writer),
                lock: Some(lock),
                live_bytes,
                compacted_bytes: 0,
                compactions: 0,
            }),
            config,
            state: Lifecycle::new(),
        })
    }

    fn recover(path: &Path, config: &LogDbConfig, table: &mut Table) -> Result<LogWriter, WalError> {
        if !path.exists() {
            return LogWriter::create(path, config.buffer_size);
        }

        let mode =
            if config.strict_recovery { RecoveryMode::Strict } else { RecoveryMode::TruncateTail };
        match wal::replay(path, mode, |record| {
            apply_ops(table, record.ops);
        }) {
            Ok(stats) => LogWriter::resume(path, config.buffer_size, stats.resume_point()),
            Err(WalError::Truncated { offset: 0 }) if !config.strict_recovery => {
                warn!(path = %path.display(), "log header incomplete, starting a new log");
                LogWriter::create(path, config.buffer_size)
            }
            Err(e) => Err(e),
        }
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log as a snapshot of the live data now.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] after close, or the I/O failure
    /// that stopped the rewrite. The old log stays in place on failure.
    pub fn compact(&self) -> StorageResult<()> {
        self.state.ensure_open()?;
        let mut log = self.lock_log()?;
        self.compact_locked(&mut log)
    }

    fn lock_log(&self) -> StorageResult<MutexGuard<'_, LogState>> {
        self.log.lock().map_err(StorageError::poisoned)
    }

    fn commit(&self, ops: Vec<BatchOp>, sync: bool) -> StorageResult<()> {
        self.state.ensure_open()?;
        if ops.is_empty() {
            return Ok(());
        }

        let mut log = self.lock_log()?;
        let writer = log.writer.as_mut().ok_or(StorageError::AlreadyClosed)?;
        let record = LogRecord::batch(writer.next_seq(), ops);
        let mark = writer.mark();
        writer.append(&record)?;
        if sync {
            if let Err(e) = writer.sync() {
                // The table never sees this record, so the log must not keep it.
                // A failed rollback poisons the writer.
                let _ = writer.rollback(mark);
                return Err(e.into());
            }
        }

        let delta = apply_ops(&mut *self.table.write()?, record.ops);
        log.live_bytes = log.live_bytes.saturating_add_signed(delta);

        if self.needs_compaction(&log) {
            // The write is already durable in the old log; a failed rewrite
            // only postpones reclaiming space.
            if let Err(e) = self.compact_locked(&mut log) {
                warn!(path = %self.path.display(), error = %e, "log compaction failed");
            }
        }
        Ok(())
    }

    fn needs_compaction(&self, log: &LogState) -> bool {
        let Some(writer) = log.writer.as_ref() else {
            return false;
        };
        let ratio = self.config.compaction_ratio.max(MIN_COMPACTION_RATIO);
        let baseline = log.compacted_bytes.max(log.live_bytes);
        let bytes = writer.bytes();
        bytes >= self.config.compaction_min_bytes && bytes >= baseline.saturating_mul(ratio)
    }

    fn compact_locked(&self, log: &mut LogState) -> StorageResult<()> {
        let writer = log.writer.as_mut().ok_or(StorageError::AlreadyClosed)?;
        let before = writer.bytes();
        {
            let table = self.table.read()?;
            writer.rewrite(table.iter().map(|(k, v)| (k.clone(), v.clone())))?;
        }
        log.compactions += 1;
        log.compacted_bytes = writer.bytes();

        info!(
            path = %self.path.display(),
            before_bytes = before,
            after_bytes = writer.bytes(),
            live_bytes = log.live_bytes,
            "compacted log"
        );
        Ok(())
    }
}

impl Database for LogDb {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.state.ensure_open()?;
        self.table.get(key)
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        self.state.ensure_open()?;
        self.table.has(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.commit(vec![BatchOp::Set { key: key.to_vec(), value: value.to_vec() }], false)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.commit(vec![BatchOp::Set { key: key.to_vec(), value: value.to_vec() }], true)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.commit(vec![BatchOp::Delete { key: key.to_vec() }], false)
    }

    fn delete_sync(&self, key: &[u8]) -> StorageResult<()> {
        self.commit(vec![BatchOp::Delete { key: key.to_vec() }], true)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(self.table.snapshot(start, end, Direction::Forward)?))
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StorageResult<Box<dyn DbIterator + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(self.table.snapshot(start, end, Direction::Reverse)?))
    }

    fn new_batch(&self) -> StorageResult<Box<dyn Batch + '_>> {
        self.state.ensure_open()?;
        Ok(Box::new(BufferedBatch::new(self)))
    }

    fn stats(&self) -> Stats {
        let mut stats = Stats::new();
        if self.state.is_closed() {
            return stats;
        }
        let (Ok(log), Ok(size)) = (self.log.lock(), self.table.len()) else {
            return stats;
        };

        stats.insert("database.type".into(), "logDB".into());
        stats.insert("database.size".into(), size.to_string());
        if let Some(writer) = log.writer.as_ref() {
            stats.insert("log.bytes".into(), writer.bytes().to_string());
            stats.insert("log.records".into(), writer.records().to_string());
            stats.insert("log.sequence".into(), writer.last_seq().to_string());
        }
        stats.insert("log.compactions".into(), log.compactions.to_string());
        stats
    }

    fn flush(&self) -> StorageResult<()> {
        self.state.ensure_open()?;
        let mut log = self.lock_log()?;
        let writer = log.writer.as_mut().ok_or(StorageError::AlreadyClosed)?;
        writer.sync()?;
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.state.close()?;

        let synced = {
            let mut log = self.log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let synced = match log.writer.take() {
                Some(mut writer) => writer.sync(),
                None => Ok(()),
            };
            if let Some(lock) = log.lock.take() {
                let _ = FileExt::unlock(&lock);
            }
            synced
        };
        self.table.close()?;

        debug!(path = %self.path.display(), "closed logdb");
        synced.map_err(StorageError::from)
    }
}

/// Take the exclusive lock guarding the log at `path`.
///
/// The lock lives on a sibling file because compaction renames a new log over
/// the old one.
fn acquire_lock(path: &Path) -> io::Result<File> {
    let lock_path = wal::lock_path(path);
    let file = OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("log already open by another handle: {}", path.display()),
        )),
        Err(e) => Err(e),
    }
}

impl BatchTarget for LogDb {
    fn apply_batch(&self, ops: Vec<BatchOp>, sync: bool) -> StorageResult<()> {
        self.commit(ops, sync)
    }
}
