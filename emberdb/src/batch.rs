//! # Batch
//!
//! A batch is a list of puts and deletes applied atomically by
//! [`Db::write`](crate::Db::write). Operations are applied in insertion
//! order, so a later operation on the same key wins.

use bytes::Bytes;

/// A write operation in a batch.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Put(Bytes, Bytes),
    Delete(Bytes),
}

impl std::fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn trunc(bytes: &Bytes) -> String {
            if bytes.len() > 10 {
                format!("{:?}...", &bytes[..10])
            } else {
                format!("{:?}", bytes)
            }
        }

        match self {
            WriteOp::Put(key, value) => write!(f, "Put({}, {})", trunc(key), trunc(value)),
            WriteOp::Delete(key) => write!(f, "Delete({})", trunc(key)),
        }
    }
}

impl WriteOp {
    pub(crate) fn key(&self) -> &Bytes {
        match self {
            WriteOp::Put(key, _) | WriteOp::Delete(key) => key,
        }
    }
}

/// A batch of write operations (puts and/or deletes).
///
/// Keys and values are held as [`Bytes`], so adding a buffer the caller
/// already owns as `Bytes` does not copy it.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<WriteOp>,
    approximate_size: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put of `value` under `key`.
    pub fn put(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        let key = key.into();
        let value = value.into();
        self.approximate_size += key.len() + value.len();
        self.ops.push(WriteOp::Put(key, value));
    }

    /// Queues a delete of `key`.
    pub fn delete(&mut self, key: impl Into<Bytes>) {
        let key = key.into();
        self.approximate_size += key.len();
        self.ops.push(WriteOp::Delete(key));
    }

    /// Drops every queued operation.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.approximate_size = 0;
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Sum of the key and value lengths queued so far.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }
}
