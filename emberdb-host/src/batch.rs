//! # WriteBatch
//!
//! A batch may be handed to any number of concurrent
//! [`Database::write`](crate::Database::write) calls: each call holds the
//! batch in read mode from submission until its completion phase starts.
//! Mutations need the batch idle and fail with
//! [`ErrorKind::BatchInUse`](crate::ErrorKind::BatchInUse) otherwise.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::Error;
use crate::slice::view;
use crate::value::Value;

#[derive(Default)]
struct SharedBatch {
    readers: AtomicUsize,
    batch: RwLock<emberdb::WriteBatch>,
}

/// An accumulator of puts and deletes applied atomically by a write.
///
/// Clones refer to the same batch.
#[derive(Clone, Default)]
pub struct WriteBatch {
    shared: Arc<SharedBatch>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the batch in write mode.
    fn mutate(&self, f: impl FnOnce(&mut emberdb::WriteBatch)) -> Result<(), Error> {
        if self.in_use() {
            return Err(Error::batch_in_use());
        }
        let Some(mut batch) = self.shared.batch.try_write() else {
            return Err(Error::batch_in_use());
        };
        f(&mut batch);
        Ok(())
    }

    /// Queues a put of `value` under `key`. Both must be buffers; they are
    /// shared with the batch, not copied.
    pub fn put(&self, key: &Value, value: &Value) -> Result<(), Error> {
        let key = view(key, "key")?;
        let value = view(value, "value")?;
        self.mutate(|batch| batch.put(key.bytes().clone(), value.bytes().clone()))
    }

    /// Queues a delete of `key`.
    pub fn delete(&self, key: &Value) -> Result<(), Error> {
        let key = view(key, "key")?;
        self.mutate(|batch| batch.delete(key.bytes().clone()))
    }

    /// Drops every queued operation.
    pub fn clear(&self) -> Result<(), Error> {
        self.mutate(|batch| batch.clear())
    }

    /// Number of queued operations.
    pub fn size(&self) -> usize {
        self.shared.batch.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether a write of this batch is in flight.
    pub fn in_use(&self) -> bool {
        self.shared.readers.load(Ordering::Acquire) > 0
    }

    /// Puts the batch in read mode until the token is dropped.
    pub(crate) fn acquire_read(&self) -> BatchReadToken {
        self.shared.readers.fetch_add(1, Ordering::AcqRel);
        BatchReadToken {
            shared: self.shared.clone(),
        }
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("size", &self.size())
            .field("readers", &self.shared.readers.load(Ordering::Relaxed))
            .finish()
    }
}

/// One in-flight write's hold on a batch.
pub(crate) struct BatchReadToken {
    shared: Arc<SharedBatch>,
}

impl BatchReadToken {
    pub(crate) fn batch(&self) -> RwLockReadGuard<'_, emberdb::WriteBatch> {
        self.shared.batch.read()
    }
}

impl Drop for BatchReadToken {
    fn drop(&mut self) {
        self.shared.readers.fetch_sub(1, Ordering::AcqRel);
    }
}
