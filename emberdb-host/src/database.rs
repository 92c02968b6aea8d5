//! # Database
//!
//! The database handle and the module-level lifecycle calls.
//!
//! Every call validates its arguments on the host thread and returns
//! `Err(BadArgument)` right away if they are wrong; nothing is submitted
//! in that case and the callback is dropped without being called.
//! Otherwise the call returns `Ok(())` and its callback later fires from
//! [`HostLoop::run`].

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use emberdb::{ComparatorRef, Range};
use tracing::debug;

use crate::batch::{BatchReadToken, WriteBatch};
use crate::error::{engine, Error, ErrorKind};
use crate::host::HostLoop;
use crate::iterator::DbIterator;
use crate::op::{AsyncOp, Callback};
use crate::options::{decode_options, decode_read_options, decode_write_options};
use crate::slice::{view, PinSet, PinnedBuffer};
use crate::snapshot::Snapshot;
use crate::value::Value;

/// The engine database shared by the host handle, its children and every
/// in-flight op. Dropped only once all of them are gone.
pub(crate) struct NativeDb {
    pub(crate) db: emberdb::Db,
    pub(crate) path: PathBuf,
    live_children: AtomicUsize,
}

impl NativeDb {
    pub(crate) fn adopt_child(&self) {
        self.live_children.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_child(&self) {
        self.live_children.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for NativeDb {
    fn drop(&mut self) {
        debug!("closing database [path={}]", self.path.display());
    }
}

struct DatabaseInner {
    host: HostLoop,
    native: Arc<NativeDb>,
    comparator: Option<ComparatorRef>,
}

/// An open database.
///
/// Clones refer to the same database. The engine database closes once every
/// clone, iterator, snapshot and in-flight call is gone.
#[derive(Clone)]
pub struct Database {
    inner: Rc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.native.path)
            .field("live_children", &self.live_children())
            .finish()
    }
}

fn take_result<T>(
    slot: &mut Option<Result<T, emberdb::Error>>,
    kind: ErrorKind,
    op: &str,
) -> Result<T, Error> {
    slot.take()
        .ok_or_else(|| Error::internal(format!("{op} finished without a result")))?
        .map_err(engine(kind))
}

fn path_arg(path: &Value) -> Result<String, Error> {
    match path {
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::bad_argument(format!(
            "path must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn boxed<T>(callback: impl FnOnce(Result<T, Error>) + 'static) -> Callback<T> {
    Box::new(callback)
}

struct OpenOp {
    path: String,
    options: emberdb::Options,
    result: Option<Result<emberdb::Db, emberdb::Error>>,
}

impl AsyncOp for OpenOp {
    type Output = Database;
    const NAME: &'static str = "open";

    fn execute(&mut self) {
        self.result = Some(emberdb::Db::open(&self.path, &self.options));
    }

    fn complete(&mut self, host: &HostLoop) -> Result<Database, Error> {
        let db = take_result(&mut self.result, ErrorKind::OpenFailed, Self::NAME)?;
        Ok(Database {
            inner: Rc::new(DatabaseInner {
                host: host.clone(),
                native: Arc::new(NativeDb {
                    db,
                    path: PathBuf::from(&self.path),
                    live_children: AtomicUsize::new(0),
                }),
                comparator: self.options.comparator.clone(),
            }),
        })
    }
}

/// Opens the database at `path`.
///
/// ## Arguments
/// - `path`: a string.
/// - `options`: an options object, or `undefined` / `null` for defaults.
/// - `callback`: receives the database handle.
///
/// ## Errors
/// - `BadArgument` (returned) if `path` is not a string or `options` is
///   malformed.
/// - `OpenFailed` (callback) with the engine status. Options asking for a
///   feature the engine lacks give status `NotSupported`.
pub fn open(
    host: &HostLoop,
    path: &Value,
    options: &Value,
    callback: impl FnOnce(Result<Database, Error>) + 'static,
) -> Result<(), Error> {
    let op = OpenOp {
        path: path_arg(path)?,
        options: decode_options(options)?,
        result: None,
    };
    host.submit(op, Some(boxed(callback)));
    Ok(())
}

struct DestroyOp {
    path: String,
    options: emberdb::Options,
    result: Option<Result<(), emberdb::Error>>,
}

impl AsyncOp for DestroyOp {
    type Output = ();
    const NAME: &'static str = "destroy";

    fn execute(&mut self) {
        self.result = Some(emberdb::destroy(&self.path, &self.options));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<(), Error> {
        take_result(&mut self.result, ErrorKind::DestroyFailed, Self::NAME)
    }
}

/// Deletes the database at `path`. The callback is optional.
///
/// ## Errors
/// - `BadArgument` (returned) for a non-string path or malformed options.
/// - `DestroyFailed` (callback), e.g. while the database is still open.
pub fn destroy(
    host: &HostLoop,
    path: &Value,
    options: &Value,
    callback: Option<Callback<()>>,
) -> Result<(), Error> {
    let op = DestroyOp {
        path: path_arg(path)?,
        options: decode_options(options)?,
        result: None,
    };
    host.submit(op, callback);
    Ok(())
}

struct RepairOp {
    path: String,
    options: emberdb::Options,
    result: Option<Result<(), emberdb::Error>>,
}

impl AsyncOp for RepairOp {
    type Output = ();
    const NAME: &'static str = "repair";

    fn execute(&mut self) {
        self.result = Some(emberdb::repair(&self.path, &self.options));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<(), Error> {
        take_result(&mut self.result, ErrorKind::RepairFailed, Self::NAME)
    }
}

/// Salvages a damaged database at `path`. The callback is optional.
///
/// ## Errors
/// - `BadArgument` (returned) for a non-string path or malformed options.
/// - `RepairFailed` (callback), e.g. when there is no database to repair.
pub fn repair(
    host: &HostLoop,
    path: &Value,
    options: &Value,
    callback: Option<Callback<()>>,
) -> Result<(), Error> {
    let op = RepairOp {
        path: path_arg(path)?,
        options: decode_options(options)?,
        result: None,
    };
    host.submit(op, callback);
    Ok(())
}

struct GetOp {
    db: Arc<NativeDb>,
    key: PinnedBuffer,
    options: emberdb::ReadOptions,
    _snapshot: Option<Snapshot>,
    result: Option<Result<Bytes, emberdb::Error>>,
}

impl AsyncOp for GetOp {
    type Output = Option<Bytes>;
    const NAME: &'static str = "get";

    fn execute(&mut self) {
        self.result = Some(self.db.db.get(&self.options, self.key.as_slice()));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<Option<Bytes>, Error> {
        match self.result.take() {
            Some(Err(err)) if err.is_not_found() => Ok(None),
            Some(result) => result.map(Some).map_err(engine(ErrorKind::ReadFailed)),
            None => Err(Error::internal("get finished without a result")),
        }
    }
}

struct WriteOp {
    db: Arc<NativeDb>,
    batch: Option<BatchReadToken>,
    options: emberdb::WriteOptions,
    result: Option<Result<(), emberdb::Error>>,
}

impl AsyncOp for WriteOp {
    type Output = ();
    const NAME: &'static str = "write";

    fn execute(&mut self) {
        self.result = self
            .batch
            .as_ref()
            .map(|token| self.db.db.write(&self.options, &token.batch()));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<(), Error> {
        // Leave read mode before the callback runs, so it may reuse the batch.
        drop(self.batch.take());
        take_result(&mut self.result, ErrorKind::WriteFailed, Self::NAME)
    }
}

struct IteratorOp {
    db: Arc<NativeDb>,
    options: emberdb::ReadOptions,
    _snapshot: Option<Snapshot>,
    result: Option<Result<emberdb::DbIterator, emberdb::Error>>,
}

impl AsyncOp for IteratorOp {
    type Output = DbIterator;
    const NAME: &'static str = "iterator";

    fn execute(&mut self) {
        self.result = Some(self.db.db.new_iterator(&self.options));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<DbIterator, Error> {
        let native = take_result(&mut self.result, ErrorKind::IteratorFailed, Self::NAME)?;
        Ok(DbIterator::new(self.db.clone(), native))
    }
}

struct SnapshotOp {
    db: Arc<NativeDb>,
    snapshot: Option<emberdb::Snapshot>,
}

impl AsyncOp for SnapshotOp {
    type Output = Snapshot;
    const NAME: &'static str = "snapshot";

    fn execute(&mut self) {
        self.snapshot = Some(self.db.db.snapshot());
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<Snapshot, Error> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| Error::internal("snapshot finished without a result"))?;
        Ok(Snapshot::new(self.db.clone(), snapshot))
    }
}

struct PropertyOp {
    db: Arc<NativeDb>,
    name: String,
    result: Option<Result<Option<String>, emberdb::Error>>,
}

impl AsyncOp for PropertyOp {
    type Output = Option<String>;
    const NAME: &'static str = "property";

    fn execute(&mut self) {
        self.result = Some(self.db.db.property(&self.name));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<Option<String>, Error> {
        take_result(&mut self.result, ErrorKind::PropertyMissing, Self::NAME)
    }
}

struct ApproximateSizesOp {
    db: Arc<NativeDb>,
    /// `start0, limit0, start1, limit1, ...`
    bounds: PinSet,
    sizes: Option<Vec<u64>>,
}

impl AsyncOp for ApproximateSizesOp {
    type Output = Vec<Value>;
    const NAME: &'static str = "approximate_sizes";

    fn execute(&mut self) {
        let ranges: Vec<Range<'_>> = self
            .bounds
            .as_slice()
            .chunks_exact(2)
            .map(|pair| Range::new(pair[0].as_slice(), pair[1].as_slice()))
            .collect();
        self.sizes = Some(self.db.db.approximate_sizes(&ranges));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<Vec<Value>, Error> {
        let sizes = self
            .sizes
            .take()
            .ok_or_else(|| Error::internal("approximate_sizes finished without a result"))?;
        Ok(sizes.into_iter().map(size_value).collect())
    }
}

/// Sizes below 2^31 fit the host's small integers; larger ones become
/// doubles.
fn size_value(size: u64) -> Value {
    match i32::try_from(size) {
        Ok(small) => Value::Integer(small),
        Err(_) => Value::Number(size as f64),
    }
}

struct CompactOp {
    db: Arc<NativeDb>,
    begin: Option<PinnedBuffer>,
    end: Option<PinnedBuffer>,
    result: Option<Result<(), emberdb::Error>>,
}

impl AsyncOp for CompactOp {
    type Output = ();
    const NAME: &'static str = "compact_range";

    fn execute(&mut self) {
        let begin = self.begin.as_ref().map(PinnedBuffer::as_slice);
        let end = self.end.as_ref().map(PinnedBuffer::as_slice);
        self.result = Some(self.db.db.compact_range(begin, end));
    }

    fn complete(&mut self, _host: &HostLoop) -> Result<(), Error> {
        match self.result.take() {
            Some(result) => result.map_err(compact_error),
            None => Err(Error::internal("compact_range finished without a result")),
        }
    }
}

/// An engine that cannot compact reports `NotImplemented`; any other
/// failure is `CompactFailed`.
fn compact_error(err: emberdb::Error) -> Error {
    let kind = match err.kind() {
        emberdb::ErrorKind::NotSupported => ErrorKind::NotImplemented,
        _ => ErrorKind::CompactFailed,
    };
    Error::from_engine(kind, err)
}

impl Database {
    fn native(&self) -> Arc<NativeDb> {
        self.inner.native.clone()
    }

    fn read_options(
        &self,
        options: &Value,
    ) -> Result<(emberdb::ReadOptions, Option<Snapshot>), Error> {
        let decoded = decode_read_options(options)?;
        if let Some(snapshot) = &decoded.snapshot {
            if !snapshot.belongs_to(&self.inner.native) {
                return Err(Error::bad_argument(
                    "snapshot belongs to a different database",
                ));
            }
        }
        let engine_options = emberdb::ReadOptions {
            verify_checksums: decoded.verify_checksums,
            fill_cache: decoded.fill_cache,
            snapshot: decoded.snapshot.as_ref().map(Snapshot::engine_snapshot),
        };
        Ok((engine_options, decoded.snapshot))
    }

    /// Reads the value stored under `key`.
    ///
    /// ## Arguments
    /// - `key`: a buffer.
    /// - `options`: read options (`verifyChecksums`, `fillCache`,
    ///   `snapshot`), or `undefined` / `null`.
    /// - `callback`: receives the value, or `None` if the key is absent. A
    ///   missing key is not an error.
    ///
    /// ## Errors
    /// - `BadArgument` (returned) if `key` is not a buffer, the options are
    ///   malformed, or the snapshot belongs to another database.
    /// - `ReadFailed` (callback) for any engine status other than not-found.
    pub fn get(
        &self,
        key: &Value,
        options: &Value,
        callback: impl FnOnce(Result<Option<Bytes>, Error>) + 'static,
    ) -> Result<(), Error> {
        let key = view(key, "key")?;
        let (options, snapshot) = self.read_options(options)?;
        let op = GetOp {
            db: self.native(),
            key,
            options,
            _snapshot: snapshot,
            result: None,
        };
        self.inner.host.submit(op, Some(boxed(callback)));
        Ok(())
    }

    /// Applies `batch` atomically. The batch cannot be modified until the
    /// write completes; the callback may modify it.
    ///
    /// ## Errors
    /// - `BadArgument` (returned) if the write options are malformed.
    /// - `WriteFailed` (callback) with the engine status.
    pub fn write(
        &self,
        batch: &WriteBatch,
        options: &Value,
        callback: impl FnOnce(Result<(), Error>) + 'static,
    ) -> Result<(), Error> {
        let options = decode_write_options(options)?;
        let op = WriteOp {
            db: self.native(),
            batch: Some(batch.acquire_read()),
            options,
            result: None,
        };
        self.inner.host.submit(op, Some(boxed(callback)));
        Ok(())
    }

    /// Creates an iterator over the database, as of `options.snapshot` if
    /// given.
    ///
    /// ## Errors
    /// - `BadArgument` (returned) if the options are malformed or the
    ///   snapshot belongs to another database.
    /// - `IteratorFailed` (callback) with the engine status.
    pub fn iterator(
        &self,
        options: &Value,
        callback: impl FnOnce(Result<DbIterator, Error>) + 'static,
    ) -> Result<(), Error> {
        let (options, snapshot) = self.read_options(options)?;
        let op = IteratorOp {
            db: self.native(),
            options,
            _snapshot: snapshot,
            result: None,
        };
        self.inner.host.submit(op, Some(boxed(callback)));
        Ok(())
    }

    /// Takes a snapshot of the current state.
    pub fn snapshot(&self, callback: impl FnOnce(Result<Snapshot, Error>) + 'static) {
        let op = SnapshotOp {
            db: self.native(),
            snapshot: None,
        };
        self.inner.host.submit(op, Some(boxed(callback)));
    }

    /// Reads an engine property, e.g. `emberdb.stats`. Unknown names give
    /// `None`.
    ///
    /// ## Errors
    /// - `BadArgument` (returned) if `name` is not a string.
    /// - `PropertyMissing` (callback) if the engine fails to compute it.
    pub fn property(
        &self,
        name: &Value,
        callback: impl FnOnce(Result<Option<String>, Error>) + 'static,
    ) -> Result<(), Error> {
        let name = name.as_str().ok_or_else(|| {
            Error::bad_argument(format!("property name must be a string, got {}", name.type_name()))
        })?;
        let op = PropertyOp {
            db: self.native(),
            name: name.to_string(),
            result: None,
        };
        self.inner.host.submit(op, Some(boxed(callback)));
        Ok(())
    }

    /// Estimates the bytes used by key ranges.
    ///
    /// ## Arguments
    /// - `bounds`: an array `[start0, limit0, start1, limit1, ...]` of
    ///   buffers, each pair a range `[start, limit)`.
    /// - `callback`: receives one size per range, `Integer` below 2^31 and
    ///   `Number` from there on.
    ///
    /// ## Errors
    /// - `BadArgument` (returned) if `bounds` is not an array, has an odd
    ///   length, or holds anything but buffers.
    pub fn approximate_sizes(
        &self,
        bounds: &Value,
        callback: impl FnOnce(Result<Vec<Value>, Error>) + 'static,
    ) -> Result<(), Error> {
        let Value::Array(items) = bounds else {
            return Err(Error::bad_argument(format!(
                "ranges must be an array, got {}",
                bounds.type_name()
            )));
        };
        if items.len() % 2 != 0 {
            return Err(Error::bad_argument(format!(
                "ranges must hold start/limit pairs, got {} bounds",
                items.len()
            )));
        }
        let mut pins = PinSet::new();
        for (i, item) in items.iter().enumerate() {
            pins.pin(item, &format!("ranges[{i}]"))?;
        }

        let op = ApproximateSizesOp {
            db: self.native(),
            bounds: pins,
            sizes: None,
        };
        self.inner.host.submit(op, Some(boxed(callback)));
        Ok(())
    }

    /// Drops overwritten and deleted data for keys in `[begin, end]`.
    /// `undefined` or `null` leaves a side of the range open. The callback
    /// is optional.
    ///
    /// ## Errors
    /// - `BadArgument` (returned) if a bound is neither absent nor a buffer.
    /// - `CompactFailed` (callback) with the engine status, or
///   `NotImplemented` if the engine cannot compact.
    pub fn compact_range(
        &self,
        begin: &Value,
        end: &Value,
        callback: Option<Callback<()>>,
    ) -> Result<(), Error> {
        let bound = |value: &Value, name: &str| -> Result<Option<PinnedBuffer>, Error> {
            if value.is_absent() {
                Ok(None)
            } else {
                view(value, name).map(Some)
            }
        };
        let op = CompactOp {
            db: self.native(),
            begin: bound(begin, "begin")?,
            end: bound(end, "end")?,
            result: None,
        };
        self.inner.host.submit(op, callback);
        Ok(())
    }

    /// The comparator the database was opened with, if one was given.
    pub fn comparator(&self) -> Option<&ComparatorRef> {
        self.inner.comparator.as_ref()
    }

    /// Number of live iterators and snapshots created from this database.
    pub fn live_children(&self) -> usize {
        self.inner.native.live_children.load(Ordering::Acquire)
    }

    /// The host loop this database delivers callbacks on.
    pub fn host(&self) -> &HostLoop {
        &self.inner.host
    }

    /// Drops this handle. The engine database closes once no clone, child
    /// or in-flight call still refers to it.
    pub fn close(self) {
        debug!(
            "database handle closed [path={}, live_children={}]",
            self.inner.native.path.display(),
            self.live_children()
        );
    }
}
