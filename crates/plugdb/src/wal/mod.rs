//! Write-ahead log for the log-structured backend
//!
//! The `logdb` backend keeps its data in memory and makes it durable through
//! an append-only log. Every write is framed and checksummed before it is
//! applied to the in-memory table; on open the log is replayed to rebuild
//! the table.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  set / delete   │────▶│   Log Writer    │────▶│    Log File     │
//! │  batch.write()  │     │  (append-only)  │     │    (on disk)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                                                         │
//!                                                         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  In-memory      │◀────│     Replay      │◀────│   Log Reader    │
//! │     table       │     │   (on open)     │     │   (validate)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Log Format
//!
//! A 16-byte header (8 bytes magic, 4 bytes version, 4 bytes reserved)
//! followed by records:
//!
//! ```text
//! [len: u32 LE][bincode(LogRecord)][crc32: u32 LE]
//! ```
//!
//! A record holds every operation of one write, so a batch is replayed
//! whole or not at all. A record that fails validation ends replay; it and
//! everything after it are discarded.
//!
//! # Usage
//!
//! ```ignore
//! use plugdb::wal::{replay, LogRecord, LogWriter, RecoveryMode};
//!
//! let mut log = LogWriter::create("state.logdb", 64 * 1024)?;
//! log.append(&LogRecord::set(log.next_seq(), b"key", b"value"))?;
//! log.sync()?;
//!
//! let stats = replay("state.logdb", RecoveryMode::default(), |record| {
//!     println!("{} ops at seq {}", record.ops.len(), record.seq);
//! })?;
//! ```

mod entry;
mod error;
mod recovery;
mod writer;

pub use entry::LogRecord;
pub use error::{WalError, WalResult};
pub use recovery::{replay, LogReader, RecordIterator, RecoveryMode, RecoveryStats};
pub use writer::{LogWriter, ResumePoint};

pub(crate) use writer::{lock_path, temp_path};

/// Sequence number - strictly increasing identifier for log records
pub type Seq = u64;

/// Magic number at the start of log files: "PLUGLOG\0"
const LOG_MAGIC: [u8; 8] = *b"PLUGLOG\0";

/// Current log format version
const LOG_VERSION: u32 = 1;

/// Size of the log file header
const HEADER_SIZE: u64 = 16; // 8 bytes magic + 4 bytes version + 4 bytes reserved
