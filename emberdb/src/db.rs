//! # Db
//!
//! The database handle. A database lives in a directory holding the
//! journal (`data.wal`), a `MANIFEST` that records the comparator the
//! database was created with, and a `LOCK` file. Only one [`Db`] per
//! directory may be open in a process at a time.
//!
//! Every method blocks the calling thread; callers that must stay
//! responsive run them on a worker thread.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::batch::{WriteBatch, WriteOp};
use crate::comparator::ComparatorRef;
use crate::config::{Options, ReadOptions, WriteOptions};
use crate::db_iter::DbIterator;
use crate::db_stats::DbStats;
use crate::error::{EmberError, Error};
use crate::journal::{self, JournalWriter, JOURNAL_FILE};
use crate::mem_table::{MemTable, Slot};
use crate::snapshot::{Snapshot, SnapshotList};

const MANIFEST_FILE: &str = "MANIFEST";
const LOCK_FILE: &str = "LOCK";
const PROPERTY_PREFIX: &str = "emberdb.";

/// A key range `[start, limit)` for [`Db::approximate_sizes`].
#[derive(Clone, Copy, Debug)]
pub struct Range<'a> {
    pub start: &'a [u8],
    pub limit: &'a [u8],
}

impl<'a> Range<'a> {
    pub fn new(start: &'a [u8], limit: &'a [u8]) -> Self {
        Self { start, limit }
    }
}

fn lock_registry() -> &'static Mutex<HashSet<PathBuf>> {
    static LOCKS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive in-process claim on a database directory, released on drop.
#[derive(Debug)]
struct PathLock {
    dir: PathBuf,
}

impl PathLock {
    fn acquire(dir: &Path) -> Result<Self, EmberError> {
        if !lock_registry().lock().insert(dir.to_path_buf()) {
            return Err(EmberError::LockHeld(dir.join(LOCK_FILE)));
        }
        let lock = Self {
            dir: dir.to_path_buf(),
        };
        fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        Ok(lock)
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        lock_registry().lock().remove(&self.dir);
    }
}

fn read_manifest(dir: &Path) -> Result<Option<String>, EmberError> {
    let path = dir.join(MANIFEST_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    contents
        .lines()
        .find_map(|line| line.strip_prefix("comparator="))
        .map(|name| Some(name.to_string()))
        .ok_or(EmberError::InvalidManifest(path))
}

fn write_manifest(dir: &Path, comparator: &ComparatorRef) -> Result<(), EmberError> {
    fs::write(
        dir.join(MANIFEST_FILE),
        format!("comparator={}\n", comparator.name()),
    )?;
    Ok(())
}

fn read_journal(dir: &Path) -> Result<Bytes, EmberError> {
    match fs::read(journal::journal_path(dir)) {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Bytes::new()),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_present(path: &Path) -> Result<(), EmberError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Inserts `ops` into `mem` with consecutive sequence numbers starting at
/// `first_seq`. Returns the last sequence number used.
fn apply(mem: &MemTable, first_seq: u64, ops: &[WriteOp]) -> u64 {
    let mut seq = first_seq;
    for op in ops {
        match op {
            WriteOp::Put(key, value) => mem.insert(key.clone(), seq, Slot::Value(value.clone())),
            WriteOp::Delete(key) => mem.insert(key.clone(), seq, Slot::Tombstone),
        }
        seq += 1;
    }
    seq.saturating_sub(1)
}

struct JournalState {
    writer: JournalWriter,
    bytes_since_compaction: u64,
}

pub(crate) struct DbInner {
    dir: PathBuf,
    options: Options,
    pub(crate) mem: MemTable,
    journal: Mutex<JournalState>,
    last_seq: AtomicU64,
    snapshots: Mutex<SnapshotList>,
    background_error: RwLock<Option<EmberError>>,
    pub(crate) stats: DbStats,
    _lock: PathLock,
}

impl DbInner {
    pub(crate) fn check_error(&self) -> Result<(), EmberError> {
        if let Some(err) = self.background_error.read().as_ref() {
            return Err(EmberError::BackgroundError(Box::new(err.clone())));
        }
        Ok(())
    }

    fn last_sequence(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    /// The sequence number a read with `options` observes.
    fn read_sequence(&self, options: &ReadOptions) -> Result<u64, EmberError> {
        let last_sequence = self.last_sequence();
        match options.snapshot {
            Some(snapshot) if snapshot.sequence() > last_sequence => {
                Err(EmberError::InvalidSnapshot {
                    snapshot: snapshot.sequence(),
                    last_sequence,
                })
            }
            Some(snapshot) => Ok(snapshot.sequence()),
            None => Ok(last_sequence),
        }
    }

    /// Resolves the read sequence for `options` and pins it, so compaction
    /// keeps every version visible at it until [`DbInner::unpin`].
    pub(crate) fn pin_read(&self, options: &ReadOptions) -> Result<u64, EmberError> {
        let mut snapshots = self.snapshots.lock();
        let seq = self.read_sequence(options)?;
        snapshots.acquire(seq);
        Ok(seq)
    }

    pub(crate) fn unpin(&self, seq: u64) -> bool {
        self.snapshots.lock().release(seq)
    }

    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<(), EmberError> {
        self.check_error()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut journal = self.journal.lock();
        self.check_error()?;

        let first_seq = self.last_sequence() + 1;
        let frame = journal::encode_record(first_seq, &batch.ops);
        if let Err(err) = journal.writer.append(&frame, options.sync) {
            warn!("journal append failed, rejecting further writes [error={:?}]", err);
            *self.background_error.write() = Some(err.clone());
            return Err(err);
        }

        let last_seq = apply(&self.mem, first_seq, &batch.ops);
        self.last_seq.store(last_seq, Ordering::Release);

        self.stats.batches_written.inc();
        self.stats.keys_written.add(batch.len() as u64);
        self.stats.journal_bytes_written.add(frame.len() as u64);

        journal.bytes_since_compaction += frame.len() as u64;
        if journal.bytes_since_compaction > self.options.write_buffer_size as u64 {
            debug!(
                "journal grew past write buffer, compacting [bytes={}]",
                journal.bytes_since_compaction
            );
            if let Err(err) = self.compact_locked(&mut journal, None, None) {
                warn!("journal compaction failed, rejecting further writes [error={:?}]", err);
                *self.background_error.write() = Some(err);
            }
        }
        Ok(())
    }

    /// Drops versions no reader can see any more and rewrites the journal
    /// from what is left. Callers hold the journal lock.
    fn compact_locked(
        &self,
        journal: &mut JournalState,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<(), EmberError> {
        let horizon = self
            .snapshots
            .lock()
            .oldest()
            .unwrap_or_else(|| self.last_sequence());
        let dropped = self.mem.collect_garbage(begin, end, horizon);

        let frames = self.mem.entries().map(|(key, seq, slot)| {
            let op = match slot {
                Slot::Value(value) => WriteOp::Put(key, value),
                Slot::Tombstone => WriteOp::Delete(key),
            };
            journal::encode_record(seq, std::slice::from_ref(&op))
        });
        journal.writer = journal::rewrite(&self.dir, frames)?;
        journal.bytes_since_compaction = 0;

        self.stats.compactions.inc();
        self.stats.versions_dropped.add(dropped as u64);
        info!(
            "compacted database [path={}, dropped_versions={}, journal_bytes={}]",
            self.dir.display(),
            dropped,
            journal.writer.len()
        );
        Ok(())
    }

    fn disk_usage(&self) -> Result<u64, EmberError> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let metadata = entry?.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

/// Holds a read sequence pinned for the length of a point read.
struct ReadPin<'a> {
    db: &'a DbInner,
    seq: u64,
}

impl<'a> ReadPin<'a> {
    fn acquire(db: &'a DbInner, options: &ReadOptions) -> Result<Self, EmberError> {
        let seq = db.pin_read(options)?;
        Ok(Self { db, seq })
    }
}

impl Drop for ReadPin<'_> {
    fn drop(&mut self) {
        self.db.unpin(self.seq);
    }
}

/// An open database.
pub struct Db {
    pub(crate) inner: Arc<DbInner>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.inner.dir)
            .field("last_sequence", &self.inner.last_sequence())
            .finish()
    }
}

impl Db {
    /// Opens the database in `path`.
    ///
    /// ## Errors
    /// - `InvalidArgument` if the database is missing and
    ///   `create_if_missing` is false, if it exists and `error_if_exists` is
    ///   true, or if it was created with a different comparator.
    /// - `Io` if another handle in this process holds the database.
    /// - `Corruption` if `paranoid_checks` is set and the journal is damaged.
    /// - `NotSupported` if compression is requested.
    pub fn open<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self, Error> {
        Ok(Self::open_inner(path.as_ref(), options)?)
    }

    fn open_inner(path: &Path, options: &Options) -> Result<Self, EmberError> {
        options.validate()?;
        let exists = path.join(MANIFEST_FILE).exists();
        if !exists && !options.create_if_missing {
            return Err(EmberError::DbMissing(path.to_path_buf()));
        }
        if exists && options.error_if_exists {
            return Err(EmberError::DbExists(path.to_path_buf()));
        }

        fs::create_dir_all(path)?;
        let dir = path.canonicalize()?;
        let lock = PathLock::acquire(&dir)?;

        let comparator = options.comparator();
        match read_manifest(&dir)? {
            Some(existing) if existing != comparator.name() => {
                return Err(EmberError::ComparatorMismatch {
                    expected: comparator.name().to_string(),
                    existing,
                });
            }
            Some(_) => {}
            None => write_manifest(&dir, &comparator)?,
        }

        let replay = journal::replay(read_journal(&dir)?);
        if let Some(damage) = replay.damage {
            if options.paranoid_checks {
                return Err(damage);
            }
            warn!(
                "dropping damaged journal tail [path={}, valid_len={}, error={}]",
                dir.display(),
                replay.valid_len,
                damage
            );
            journal::truncate(&dir, replay.valid_len)?;
        }

        let mem = MemTable::new(comparator);
        let mut last_seq = 0;
        for record in &replay.records {
            last_seq = last_seq.max(apply(&mem, record.seq, &record.ops));
        }

        let writer = JournalWriter::open(&dir)?;
        let stats = DbStats::default();
        stats.records_recovered.add(replay.records.len() as u64);
        info!(
            "opened database [path={}, records={}, last_sequence={}]",
            dir.display(),
            replay.records.len(),
            last_seq
        );

        Ok(Self {
            inner: Arc::new(DbInner {
                dir,
                options: options.clone(),
                mem,
                journal: Mutex::new(JournalState {
                    writer,
                    bytes_since_compaction: 0,
                }),
                last_seq: AtomicU64::new(last_seq),
                snapshots: Mutex::new(SnapshotList::default()),
                background_error: RwLock::new(None),
                stats,
                _lock: lock,
            }),
        })
    }

    /// Reads the value stored under `key`.
    ///
    /// Returns a `NotFound` error when the key is absent.
    pub fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Bytes, Error> {
        let pin = ReadPin::acquire(&self.inner, options)?;
        self.inner.stats.gets.inc();
        match self.inner.mem.get(key, pin.seq) {
            Some(Slot::Value(value)) => Ok(value),
            Some(Slot::Tombstone) | None => Err(EmberError::KeyNotFound.into()),
        }
    }

    /// Applies every operation in `batch` atomically.
    pub fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<(), Error> {
        Ok(self.inner.write(options, batch)?)
    }

    /// Creates an iterator over the database as of `options.snapshot`, or
    /// over the current state. The iterator starts out unpositioned.
    pub fn new_iterator(&self, options: &ReadOptions) -> Result<DbIterator, Error> {
        let seq = self.inner.pin_read(options)?;
        self.inner.stats.iterators_created.inc();
        Ok(DbIterator::new(self.inner.clone(), seq))
    }

    /// Pins the current state. Hand the snapshot back with
    /// [`Db::release_snapshot`].
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshots = self.inner.snapshots.lock();
        let seq = self.inner.last_sequence();
        snapshots.acquire(seq);
        Snapshot::new(seq)
    }

    pub fn release_snapshot(&self, snapshot: Snapshot) {
        if !self.inner.unpin(snapshot.sequence()) {
            warn!("released unknown snapshot [seq={}]", snapshot.sequence());
        }
    }

    /// Returns the value of a named property, or `None` for names the
    /// engine does not know.
    ///
    /// Known properties: `emberdb.num-entries`, `emberdb.sequence`,
    /// `emberdb.live-snapshots`, `emberdb.approximate-memory-usage`,
    /// `emberdb.disk-usage` and `emberdb.stats`.
    pub fn property(&self, name: &str) -> Result<Option<String>, Error> {
        let Some(property) = name.strip_prefix(PROPERTY_PREFIX) else {
            return Ok(None);
        };
        let value = match property {
            "num-entries" => self.inner.mem.len().to_string(),
            "sequence" => self.inner.last_sequence().to_string(),
            "live-snapshots" => self.inner.snapshots.lock().len().to_string(),
            "approximate-memory-usage" => self.inner.mem.memory_usage().to_string(),
            "disk-usage" => self.inner.disk_usage()?.to_string(),
            "stats" => self.inner.stats.render(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Approximate bytes used by each range, in order.
    pub fn approximate_sizes(&self, ranges: &[Range<'_>]) -> Vec<u64> {
        ranges
            .iter()
            .map(|r| self.inner.mem.approximate_size(r.start, r.limit))
            .collect()
    }

    /// Drops overwritten and deleted versions of keys in `[begin, end]` and
    /// rewrites the journal. `None` leaves that side of the range open.
    pub fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), Error> {
        self.inner.check_error()?;
        let mut journal = self.inner.journal.lock();
        self.inner.compact_locked(&mut journal, begin, end)?;
        Ok(())
    }
}

/// Deletes the database in `path`. A missing directory is not an error.
pub fn destroy<P: AsRef<Path>>(path: P, _options: &Options) -> Result<(), Error> {
    Ok(destroy_inner(path.as_ref())?)
}

fn destroy_inner(path: &Path) -> Result<(), EmberError> {
    if !path.exists() {
        return Ok(());
    }
    let dir = path.canonicalize()?;
    let lock = PathLock::acquire(&dir)?;
    for file in [JOURNAL_FILE, "data.wal.tmp", MANIFEST_FILE, LOCK_FILE] {
        remove_if_present(&dir.join(file))?;
    }
    drop(lock);
    // Other files in the directory are not ours to delete.
    let _ = fs::remove_dir(&dir);
    info!("destroyed database [path={}]", dir.display());
    Ok(())
}

/// Salvages what it can of a damaged database in `path`: keeps every
/// intact journal record, drops the rest, and restores a missing manifest.
pub fn repair<P: AsRef<Path>>(path: P, options: &Options) -> Result<(), Error> {
    Ok(repair_inner(path.as_ref(), options)?)
}

fn repair_inner(path: &Path, options: &Options) -> Result<(), EmberError> {
    if !path.is_dir() {
        return Err(EmberError::NothingToRepair(path.to_path_buf()));
    }
    let dir = path.canonicalize()?;
    let _lock = PathLock::acquire(&dir)?;

    let data = read_journal(&dir)?;
    let total = data.len();
    let replay = journal::replay(data);
    let frames: Vec<Bytes> = replay
        .records
        .iter()
        .map(|record| journal::encode_record(record.seq, &record.ops))
        .collect();
    journal::rewrite(&dir, frames)?;

    if !matches!(read_manifest(&dir), Ok(Some(_))) {
        write_manifest(&dir, &options.comparator())?;
    }
    info!(
        "repaired database [path={}, records={}, dropped_bytes={}]",
        dir.display(),
        replay.records.len(),
        total as u64 - replay.valid_len
    );
    Ok(())
}
