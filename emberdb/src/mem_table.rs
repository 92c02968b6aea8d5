use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::comparator::ComparatorRef;

/// Fixed bookkeeping cost charged per entry on top of key and value bytes.
pub(crate) const ENTRY_OVERHEAD: usize = 16;

/// A user key tagged with the sequence number of the write that produced
/// it. Orders by user key (through the database comparator), then by
/// sequence number descending so the newest version of a key comes first.
#[derive(Clone)]
pub(crate) struct InternalKey {
    pub(crate) user_key: Bytes,
    pub(crate) seq: u64,
    comparator: ComparatorRef,
}

impl InternalKey {
    pub(crate) fn new(user_key: Bytes, seq: u64, comparator: ComparatorRef) -> Self {
        Self {
            user_key,
            seq,
            comparator,
        }
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&self.user_key, &other.user_key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for InternalKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InternalKey {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Value(Bytes),
    Tombstone,
}

impl Slot {
    fn len(&self) -> usize {
        match self {
            Slot::Value(v) => v.len(),
            Slot::Tombstone => 0,
        }
    }
}

/// The multi-version in-memory table holding every live version of every
/// key.
pub(crate) struct MemTable {
    map: SkipMap<InternalKey, Slot>,
    cmp: ComparatorRef,
    size: AtomicUsize,
}

impl MemTable {
    pub(crate) fn new(cmp: ComparatorRef) -> Self {
        Self {
            map: SkipMap::new(),
            cmp,
            size: AtomicUsize::new(0),
        }
    }

    fn key(&self, user_key: &[u8], seq: u64) -> InternalKey {
        InternalKey::new(Bytes::copy_from_slice(user_key), seq, self.cmp.clone())
    }

    fn same_user_key(&self, a: &[u8], b: &[u8]) -> bool {
        self.cmp.compare(a, b) == Ordering::Equal
    }

    pub(crate) fn insert(&self, user_key: Bytes, seq: u64, slot: Slot) {
        self.size.fetch_add(
            user_key.len() + slot.len() + ENTRY_OVERHEAD,
            AtomicOrdering::Relaxed,
        );
        self.map
            .insert(InternalKey::new(user_key, seq, self.cmp.clone()), slot);
    }

    /// The newest version of `user_key` written at or before `seq`.
    pub(crate) fn get(&self, user_key: &[u8], seq: u64) -> Option<Slot> {
        let entry = self.map.range(self.key(user_key, seq)..).next()?;
        if self.same_user_key(&entry.key().user_key, user_key) {
            Some(entry.value().clone())
        } else {
            None
        }
    }

    /// The first live key at or after `lower`, as seen at `seq`.
    pub(crate) fn first_visible(
        &self,
        lower: Bound<&[u8]>,
        seq: u64,
    ) -> Option<(Bytes, Bytes)> {
        let start = match lower {
            Bound::Included(k) => Bound::Included(self.key(k, u64::MAX)),
            Bound::Excluded(k) => Bound::Excluded(self.key(k, 0)),
            Bound::Unbounded => Bound::Unbounded,
        };

        let mut decided: Option<Bytes> = None;
        for entry in self.map.range((start, Bound::Unbounded)) {
            let key = entry.key();
            if key.seq > seq {
                continue;
            }
            if let Some(done) = &decided {
                if self.same_user_key(done, &key.user_key) {
                    continue;
                }
            }
            match entry.value() {
                Slot::Value(value) => return Some((key.user_key.clone(), value.clone())),
                Slot::Tombstone => decided = Some(key.user_key.clone()),
            }
        }
        None
    }

    /// The last live key at or before `upper`, as seen at `seq`.
    pub(crate) fn last_visible(
        &self,
        upper: Bound<&[u8]>,
        seq: u64,
    ) -> Option<(Bytes, Bytes)> {
        let end = match upper {
            Bound::Included(k) => Bound::Included(self.key(k, 0)),
            Bound::Excluded(k) => Bound::Excluded(self.key(k, u64::MAX)),
            Bound::Unbounded => Bound::Unbounded,
        };

        let mut decided: Option<Bytes> = None;
        for entry in self.map.range((Bound::Unbounded, end)).rev() {
            let key = entry.key();
            if let Some(done) = &decided {
                if self.same_user_key(done, &key.user_key) {
                    continue;
                }
            }
            decided = Some(key.user_key.clone());
            if let Some(Slot::Value(value)) = self.get(&key.user_key, seq) {
                return Some((key.user_key.clone(), value));
            }
        }
        None
    }

    /// Drops versions no reader at or after `horizon` can observe, for user
    /// keys inside `[begin, end]`. Returns the number of versions removed.
    pub(crate) fn collect_garbage(
        &self,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
        horizon: u64,
    ) -> usize {
        let start = match begin {
            Some(k) => Bound::Included(self.key(k, u64::MAX)),
            None => Bound::Unbounded,
        };
        let stop = match end {
            Some(k) => Bound::Included(self.key(k, 0)),
            None => Bound::Unbounded,
        };

        let mut removed = 0;
        // The user key whose newest version at or below the horizon was seen.
        let mut settled: Option<Bytes> = None;
        for entry in self.map.range((start, stop)) {
            let key = entry.key();
            if key.seq > horizon {
                continue;
            }
            let shadowed = matches!(&settled, Some(k) if self.same_user_key(k, &key.user_key));
            let obsolete = shadowed || matches!(entry.value(), Slot::Tombstone);
            settled = Some(key.user_key.clone());
            if obsolete && entry.remove() {
                self.size.fetch_sub(
                    key.user_key.len() + entry.value().len() + ENTRY_OVERHEAD,
                    AtomicOrdering::Relaxed,
                );
                removed += 1;
            }
        }
        removed
    }

    /// Bytes held by versions of user keys in `[start, limit)`.
    pub(crate) fn approximate_size(&self, start: &[u8], limit: &[u8]) -> u64 {
        if self.cmp.compare(start, limit) != Ordering::Less {
            return 0;
        }
        let range = (
            Bound::Included(self.key(start, u64::MAX)),
            Bound::Excluded(self.key(limit, u64::MAX)),
        );
        self.map
            .range(range)
            .map(|e| (e.key().user_key.len() + e.value().len() + ENTRY_OVERHEAD) as u64)
            .sum()
    }

    /// Every version, in table order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (Bytes, u64, Slot)> + '_ {
        self.map
            .iter()
            .map(|e| (e.key().user_key.clone(), e.key().seq, e.value().clone()))
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn memory_usage(&self) -> usize {
        self.size.load(AtomicOrdering::Relaxed)
    }
}
