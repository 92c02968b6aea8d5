use std::sync::Arc;

use crate::database::NativeDb;

struct SnapshotInner {
    db: Arc<NativeDb>,
    snapshot: emberdb::Snapshot,
}

impl Drop for SnapshotInner {
    fn drop(&mut self) {
        self.db.db.release_snapshot(self.snapshot);
        self.db.release_child();
    }
}

/// A point-in-time view of a database, usable as the `snapshot` read
/// option of the database that created it.
///
/// Clones share one engine snapshot, released when the last clone drops.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

impl Snapshot {
    /// Adopts an engine snapshot taken from `db`.
    pub(crate) fn new(db: Arc<NativeDb>, snapshot: emberdb::Snapshot) -> Self {
        db.adopt_child();
        Self {
            inner: Arc::new(SnapshotInner { db, snapshot }),
        }
    }

    pub(crate) fn belongs_to(&self, db: &Arc<NativeDb>) -> bool {
        Arc::ptr_eq(&self.inner.db, db)
    }

    pub(crate) fn engine_snapshot(&self) -> emberdb::Snapshot {
        self.inner.snapshot
    }

    /// Whether both handles refer to the same snapshot.
    pub fn same_as(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sequence number of the last write this snapshot observes.
    pub fn sequence(&self) -> u64 {
        self.inner.snapshot.sequence()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence())
            .finish()
    }
}
