use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::db::DbInner;
use crate::error::Error;

/// A bidirectional cursor over the database as of one sequence number.
///
/// A new iterator is not positioned; call one of the seek methods first.
/// The sequence number it reads at stays pinned until the iterator is
/// dropped, so compaction never removes a version it can still return.
pub struct DbIterator {
    db: Arc<DbInner>,
    seq: u64,
    current: Option<(Bytes, Bytes)>,
}

impl DbIterator {
    /// Takes ownership of a pin the caller already holds on `seq`.
    pub(crate) fn new(db: Arc<DbInner>, seq: u64) -> Self {
        Self {
            db,
            seq,
            current: None,
        }
    }

    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn seek_to_first(&mut self) {
        self.current = self.db.mem.first_visible(Bound::Unbounded, self.seq);
    }

    pub fn seek_to_last(&mut self) {
        self.current = self.db.mem.last_visible(Bound::Unbounded, self.seq);
    }

    /// Positions at the first key at or after `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.current = self
            .db
            .mem
            .first_visible(Bound::Included(target), self.seq);
    }

    /// Moves to the next key. No-op when not valid.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.db.mem.first_visible(Bound::Excluded(&key[..]), self.seq);
        }
    }

    /// Moves to the previous key. No-op when not valid.
    pub fn prev(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.db.mem.last_visible(Bound::Excluded(&key[..]), self.seq);
        }
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(key, _)| key.as_ref())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, value)| value.as_ref())
    }

    /// Reports a failure the database hit since this iterator was created.
    pub fn status(&self) -> Result<(), Error> {
        Ok(self.db.check_error()?)
    }
}

impl std::fmt::Debug for DbIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbIterator")
            .field("seq", &self.seq)
            .field("key", &self.key())
            .finish()
    }
}

impl Drop for DbIterator {
    fn drop(&mut self) {
        if !self.db.unpin(self.seq) {
            warn!("iterator pin already released [seq={}]", self.seq);
        }
    }
}
