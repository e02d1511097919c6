//! Storage backend implementations.
//!
//! Every backend implements [`Database`](crate::Database):
//!
//! - [`MemDb`] - In-memory ordered map, no durability
//! - [`LogDb`] - In-memory table made durable by a write-ahead log
//! - [`RedbDb`] - Embedded copy-on-write B-tree (redb)
//! - [`NullDb`] - Accepts every write, stores nothing
//!
//! [`PrefixDb`] is not a backend of its own: it partitions the keyspace of
//! any other database.

mod logdb;
mod memdb;
mod nulldb;
pub mod prefix;
pub mod redb;

pub use logdb::{LogDb, LogDbConfig};
pub use memdb::MemDb;
pub use nulldb::NullDb;
pub use prefix::{prefix_iterator, PrefixDb};
pub use redb::{RedbConfig, RedbDb};
