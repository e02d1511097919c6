//! plugdb
//!
//! A pluggable key-value storage abstraction: one byte-oriented interface
//! over interchangeable storage engines, so callers can swap the engine
//! without code changes.
//!
//! # Overview
//!
//! Every backend implements [`Database`]. Callers open a store by backend
//! name through the registry and program against the trait; the engine
//! behind it stays an implementation detail. Atomic batches, ordered
//! iteration and the open/closed lifecycle behave the same on every engine.
//!
//! # Core Traits
//!
//! - [`Database`] - Point reads and writes, iteration, batches, lifecycle
//! - [`Batch`] - An atomic group of pending writes
//! - [`DbIterator`] - Ordered iteration over a `[start, end)` key range
//!
//! # Backends
//!
//! | Name     | Type                      | Durability                  |
//! |----------|---------------------------|-----------------------------|
//! | `memdb`  | [`backends::MemDb`]       | none                        |
//! | `logdb`  | [`backends::LogDb`]       | write-ahead log             |
//! | `redb`   | [`backends::RedbDb`]      | copy-on-write B-tree file   |
//! | `nulldb` | [`backends::NullDb`]      | stores nothing              |
//!
//! Further engines are added with [`register_backend`].
//!
//! # Error Handling
//!
//! All storage operations return [`StorageResult<T>`], which is an alias for
//! `Result<T, StorageError>`. The [`StorageError`] enum covers misuse
//! (closed handles, inverted ranges), registry failures and backend faults.
//!
//! # Example
//!
//! ```ignore
//! use plugdb::{new_db, Database};
//!
//! // Open or create data/state.logdb
//! let db = new_db("state", "logdb", "data")?;
//!
//! // Write some data atomically
//! let mut batch = db.new_batch()?;
//! batch.set(b"user:1", b"Alice")?;
//! batch.set(b"user:2", b"Bob")?;
//! batch.write_sync()?;
//!
//! // Iterate it back in key order
//! let mut iter = db.iterator(Some(b"user:".as_slice()), None)?;
//! while iter.valid() {
//!     println!("{:?} = {:?}", iter.key()?, iter.value()?);
//!     iter.next()?;
//! }
//! iter.close()?;
//! ```
//!
//! # Modules
//!
//! - [`engine`] - The storage contract and shared building blocks
//! - [`backends`] - Concrete storage backend implementations
//! - [`registry`] - Name to constructor mapping
//! - [`wal`] - Write-ahead log used by the `logdb` backend

pub mod backends;
pub mod engine;
pub mod registry;
pub mod wal;

pub use engine::{
    collect_entries, Batch, BatchOp, Database, DbIterator, Entries, KeyRange, KeyValue, Stats,
    StorageError, StorageResult,
};
pub use registry::{new_db, register_backend, BackendType, Constructor, Registry};
