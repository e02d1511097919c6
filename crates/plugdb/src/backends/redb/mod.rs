//! Redb storage backend.
//!
//! This module provides a storage backend implementation using Redb,
//! a pure-Rust embedded database with copy-on-write B-trees.
//!
//! # Features
//!
//! - **Pure Rust**: No C dependencies, works everywhere Rust does
//! - **MVCC snapshots**: Iterators hold a read transaction and never see
//!   later writes
//! - **Streaming iteration**: Ranges are loaded in bounded batches
//! - **Embedded**: No external database server required
//!
//! # Example
//!
//! ```ignore
//! use plugdb::backends::RedbDb;
//! use plugdb::Database;
//!
//! // Open a database (creates if it doesn't exist)
//! let db = RedbDb::open("my_database.redb")?;
//!
//! let mut batch = db.new_batch()?;
//! batch.set(b"user:1", b"Alice")?;
//! batch.set(b"user:2", b"Bob")?;
//! batch.write_sync()?;
//!
//! assert_eq!(db.get(b"user:1")?, Some(b"Alice".to_vec()));
//! ```
//!
//! # Configuration
//!
//! Use `RedbConfig` to customize the database behavior:
//!
//! ```ignore
//! use plugdb::backends::{RedbConfig, RedbDb};
//!
//! let config = RedbConfig::new()
//!     .cache_size(100 * 1024 * 1024); // 100 MB cache
//!
//! let db = RedbDb::open_with_config("my_database.redb", config)?;
//! ```

mod engine;
mod iterator;
pub mod tables;

pub use engine::{RedbConfig, RedbDb};
pub use iterator::{RedbIterator, DEFAULT_BATCH_SIZE};
