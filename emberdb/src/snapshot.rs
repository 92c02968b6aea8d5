use std::collections::BTreeMap;

/// A point-in-time view of a database.
///
/// Snapshots are plain tokens: the database keeps every version a live
/// snapshot can observe until the snapshot is handed back with
/// [`Db::release_snapshot`](crate::Db::release_snapshot).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    seq: u64,
}

impl Snapshot {
    pub(crate) fn new(seq: u64) -> Self {
        Self { seq }
    }

    /// The sequence number of the last write visible through this snapshot.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

/// Reference counts of the sequence numbers pinned by live snapshots and
/// iterators.
#[derive(Debug, Default)]
pub(crate) struct SnapshotList {
    pinned: BTreeMap<u64, usize>,
}

impl SnapshotList {
    pub(crate) fn acquire(&mut self, seq: u64) {
        *self.pinned.entry(seq).or_insert(0) += 1;
    }

    /// Returns false if `seq` was not pinned.
    pub(crate) fn release(&mut self, seq: u64) -> bool {
        match self.pinned.get_mut(&seq) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.pinned.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub(crate) fn oldest(&self) -> Option<u64> {
        self.pinned.keys().next().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.pinned.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_list_tracks_oldest_pin() {
        let mut list = SnapshotList::default();
        list.acquire(7);
        list.acquire(3);
        list.acquire(3);
        assert_eq!(list.oldest(), Some(3));
        assert_eq!(list.len(), 3);

        assert!(list.release(3));
        assert_eq!(list.oldest(), Some(3));
        assert!(list.release(3));
        assert_eq!(list.oldest(), Some(7));
        assert!(!list.release(3));
        assert!(list.release(7));
        assert_eq!(list.oldest(), None);
    }
}
