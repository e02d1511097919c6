//! Buffered write batches.
//!
//! Engines differ in what they can apply atomically, so the batch layer never
//! hands operations to the engine one at a time. [`BufferedBatch`] collects
//! every operation in memory and passes the whole list to the engine's
//! [`BatchTarget::apply_batch`] in one call, which the engine must apply
//! all-or-nothing.

use serde::{Deserialize, Serialize};

use super::{Batch, StorageError, StorageResult};

/// A single pending batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    /// Insert or replace a key.
    Set {
        /// The key to write.
        key: Vec<u8>,
        /// The value to store.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// The key to remove.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// The key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Approximate payload size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Set { key, value } => key.len() + value.len(),
            Self::Delete { key } => key.len(),
        }
    }
}

/// An engine that can apply an ordered list of operations atomically.
pub trait BatchTarget: Send + Sync {
    /// Apply `ops` in order, all-or-nothing. When `sync` is true the result
    /// must be durable before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyClosed`] if the engine is closed, or the
    /// engine's failure. Nothing is applied on error.
    fn apply_batch(&self, ops: Vec<BatchOp>, sync: bool) -> StorageResult<()>;
}

/// The standard [`Batch`] implementation: buffer, then single-shot.
pub struct BufferedBatch<'a> {
    target: &'a dyn BatchTarget,
    ops: Vec<BatchOp>,
    spent: bool,
}

impl<'a> BufferedBatch<'a> {
    /// Create an empty batch that commits into `target`.
    pub fn new(target: &'a dyn BatchTarget) -> Self {
        Self { target, ops: Vec::new(), spent: false }
    }

    /// The queued operations, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchClosed`] once spent.
    pub fn ops(&self) -> StorageResult<&[BatchOp]> {
        self.ensure_live()?;
        Ok(&self.ops)
    }

    fn ensure_live(&self) -> StorageResult<()> {
        if self.spent {
            Err(StorageError::BatchClosed)
        } else {
            Ok(())
        }
    }

    fn commit(&mut self, sync: bool) -> StorageResult<()> {
        self.ensure_live()?;
        self.spent = true;
        self.target.apply_batch(std::mem::take(&mut self.ops), sync)
    }
}

impl Batch for BufferedBatch<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.ensure_live()?;
        self.ops.push(BatchOp::Set { key: key.to_vec(), value: value.to_vec() });
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.ensure_live()?;
        self.ops.push(BatchOp::Delete { key: key.to_vec() });
        Ok(())
    }

    fn write(&mut self) -> StorageResult<()> {
        self.commit(false)
    }

    fn write_sync(&mut self) -> StorageResult<()> {
        self.commit(true)
    }

    fn close(&mut self) -> StorageResult<()> {
        self.ensure_live()?;
        self.spent = true;
        self.ops.clear();
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        self.ensure_live()?;
        Ok(self.ops.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        applied: Mutex<Vec<(Vec<BatchOp>, bool)>>,
    }

    impl BatchTarget for Recorder {
        fn apply_batch(&self, ops: Vec<BatchOp>, sync: bool) -> StorageResult<()> {
            self.applied.lock().map_err(StorageError::poisoned)?.push((ops, sync));
            Ok(())
        }
    }

    #[test]
    fn test_write_hands_over_ops_in_order() {
        let target = Recorder::default();
        let mut batch = BufferedBatch::new(&target);
        batch.set(b"x", b"1").unwrap();
        batch.set(b"x", b"2").unwrap();
        batch.delete(b"y").unwrap();
        assert_eq!(batch.len().unwrap(), 3);

        batch.write_sync().unwrap();

        let applied = target.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        let (ops, sync) = &applied[0];
        assert!(*sync);
        assert_eq!(ops[0], BatchOp::Set { key: b"x".to_vec(), value: b"1".to_vec() });
        assert_eq!(ops[1], BatchOp::Set { key: b"x".to_vec(), value: b"2".to_vec() });
        assert_eq!(ops[2], BatchOp::Delete { key: b"y".to_vec() });
    }

    #[test]
    fn test_spent_batch_rejects_everything() {
        let target = Recorder::default();
        let mut batch = BufferedBatch::new(&target);
        batch.set(b"k", b"v").unwrap();
        batch.write().unwrap();

        assert!(matches!(batch.set(b"k", b"v"), Err(StorageError::BatchClosed)));
        assert!(matches!(batch.delete(b"k"), Err(StorageError::BatchClosed)));
        assert!(matches!(batch.write(), Err(StorageError::BatchClosed)));
        assert!(matches!(batch.write_sync(), Err(StorageError::BatchClosed)));
        assert!(matches!(batch.close(), Err(StorageError::BatchClosed)));
        assert!(matches!(batch.len(), Err(StorageError::BatchClosed)));
    }

    #[test]
    fn test_close_discards() {
        let target = Recorder::default();
        let mut batch = BufferedBatch::new(&target);
        batch.set(b"k", b"v").unwrap();
        batch.close().unwrap();

        assert!(target.applied.lock().unwrap().is_empty());
        assert!(matches!(batch.write(), Err(StorageError::BatchClosed)));
    }

    #[test]
    fn test_empty_batch_still_reaches_target() {
        let target = Recorder::default();
        let mut batch = BufferedBatch::new(&target);
        assert!(batch.is_empty().unwrap());
        batch.write().unwrap();

        let applied = target.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert!(applied[0].0.is_empty());
    }
}
