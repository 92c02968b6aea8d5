use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! db_stat_name {
    ($suffix:expr) => {
        concat!("db/", $suffix)
    };
}

pub const BATCHES_WRITTEN: &str = db_stat_name!("batches_written");
pub const KEYS_WRITTEN: &str = db_stat_name!("keys_written");
pub const JOURNAL_BYTES_WRITTEN: &str = db_stat_name!("journal_bytes_written");
pub const GETS: &str = db_stat_name!("gets");
pub const ITERATORS_CREATED: &str = db_stat_name!("iterators_created");
pub const COMPACTIONS: &str = db_stat_name!("compactions");
pub const VERSIONS_DROPPED: &str = db_stat_name!("versions_dropped");
pub const RECORDS_RECOVERED: &str = db_stat_name!("records_recovered");

#[derive(Default)]
pub(crate) struct Counter {
    value: AtomicU64,
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

impl Counter {
    pub(crate) fn inc(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn add(&self, value: u64) -> u64 {
        self.value.fetch_add(value, Ordering::Relaxed)
    }

    pub(crate) fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[non_exhaustive]
#[derive(Debug, Default)]
pub(crate) struct DbStats {
    pub(crate) batches_written: Counter,
    pub(crate) keys_written: Counter,
    pub(crate) journal_bytes_written: Counter,
    pub(crate) gets: Counter,
    pub(crate) iterators_created: Counter,
    pub(crate) compactions: Counter,
    pub(crate) versions_dropped: Counter,
    pub(crate) records_recovered: Counter,
}

impl DbStats {
    fn entries(&self) -> [(&'static str, &Counter); 8] {
        [
            (BATCHES_WRITTEN, &self.batches_written),
            (KEYS_WRITTEN, &self.keys_written),
            (JOURNAL_BYTES_WRITTEN, &self.journal_bytes_written),
            (GETS, &self.gets),
            (ITERATORS_CREATED, &self.iterators_created),
            (COMPACTIONS, &self.compactions),
            (VERSIONS_DROPPED, &self.versions_dropped),
            (RECORDS_RECOVERED, &self.records_recovered),
        ]
    }

    /// One `name value` line per counter.
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for (name, counter) in self.entries() {
            let _ = writeln!(out, "{name} {}", counter.get());
        }
        out
    }
}
