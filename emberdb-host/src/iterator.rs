use std::sync::Arc;

use bytes::Bytes;

use crate::database::NativeDb;
use crate::error::{engine, Error, ErrorKind};
use crate::slice::{materialize, view};
use crate::value::Value;

/// A cursor over a database as of the moment it was created.
///
/// Positioning methods run synchronously on the host thread. The iterator
/// starts unpositioned. Keys and values are returned as copies, so they
/// stay valid after the cursor moves.
pub struct DbIterator {
    native: Option<emberdb::DbIterator>,
    db: Arc<NativeDb>,
}

impl DbIterator {
    pub(crate) fn new(db: Arc<NativeDb>, native: emberdb::DbIterator) -> Self {
        db.adopt_child();
        Self {
            native: Some(native),
            db,
        }
    }

    fn native(&self) -> Option<&emberdb::DbIterator> {
        self.native.as_ref()
    }

    fn native_mut(&mut self) -> Option<&mut emberdb::DbIterator> {
        self.native.as_mut()
    }

    pub fn valid(&self) -> bool {
        self.native().is_some_and(|it| it.valid())
    }

    pub fn seek_to_first(&mut self) {
        if let Some(it) = self.native_mut() {
            it.seek_to_first();
        }
    }

    pub fn seek_to_last(&mut self) {
        if let Some(it) = self.native_mut() {
            it.seek_to_last();
        }
    }

    /// Positions at the first key at or after `target`, which must be a
    /// buffer.
    pub fn seek(&mut self, target: &Value) -> Result<(), Error> {
        let target = view(target, "target")?;
        if let Some(it) = self.native_mut() {
            it.seek(target.as_slice());
        }
        Ok(())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        if let Some(it) = self.native_mut() {
            it.next();
        }
    }

    pub fn prev(&mut self) {
        if let Some(it) = self.native_mut() {
            it.prev();
        }
    }

    /// A copy of the current key, or `None` when not valid.
    pub fn key(&self) -> Option<Bytes> {
        self.native().and_then(|it| it.key()).map(materialize)
    }

    /// A copy of the current value, or `None` when not valid.
    pub fn value(&self) -> Option<Bytes> {
        self.native().and_then(|it| it.value()).map(materialize)
    }

    pub fn status(&self) -> Result<(), Error> {
        match self.native() {
            Some(it) => it.status().map_err(engine(ErrorKind::IteratorFailed)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for DbIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbIterator")
            .field("valid", &self.valid())
            .field("path", &self.db.path)
            .finish()
    }
}

impl Drop for DbIterator {
    fn drop(&mut self) {
        // The engine iterator goes first; the database may be freed as soon
        // as the child count allows it.
        drop(self.native.take());
        self.db.release_child();
    }
}
