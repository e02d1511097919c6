//! Storage engine traits and abstractions.
//!
//! This module defines the contract every backend must satisfy:
//!
//! - [`Database`] - The façade: point reads and writes, iteration, batches
//! - [`Batch`] - Atomic groups of writes, usually a [`BufferedBatch`]
//! - [`DbIterator`] - Ordered iteration over a `[start, end)` key range
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`] which is an alias for
//! `Result<T, StorageError>`. See [`StorageError`] for the possible error variants.

mod batch;
mod error;
mod iterator;
mod lifecycle;
pub mod range;
mod traits;

pub use batch::{BatchOp, BatchTarget, BufferedBatch};
pub use error::{BoxError, StorageError, StorageResult};
pub use iterator::{collect_entries, Direction, Entries, SnapshotIterator};
pub use lifecycle::Lifecycle;
pub use range::KeyRange;
pub use traits::{Batch, Database, DbIterator, KeyValue, Stats};
