//! Key ordering.
//!
//! Every database orders its keys with exactly one [`Comparator`]. The
//! comparator's name is persisted next to the data so that a database is
//! never reopened with an incompatible ordering.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A total order over byte-string keys.
///
/// Implementations must be thread-safe: the engine calls `compare` from
/// every thread that reads or writes the database.
pub trait Comparator: Send + Sync {
    /// A stable name for this ordering. Databases created with one name can
    /// only be reopened with a comparator of the same name.
    fn name(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Shared handle to a comparator.
pub type ComparatorRef = Arc<dyn Comparator>;

/// Lexicographic byte ordering. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &str {
        "emberdb.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

pub(crate) fn default_comparator() -> ComparatorRef {
    Arc::new(BytewiseComparator)
}

impl fmt::Debug for dyn Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Comparator").field(&self.name()).finish()
    }
}
