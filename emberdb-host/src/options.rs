//! Decoding loosely typed host option mappings into engine options.
//!
//! An absent mapping (`undefined` or `null`) means "all defaults". Unknown
//! keys are ignored. A recognized key holding a value of the wrong type is
//! rejected, as is a present mapping that is not an object.
//!
//! Block and cache tuning keys (`maxOpenFiles`, `blockSize`,
//! `blockRestartInterval`, `blockCache`, `verifyChecksums`, `fillCache`) are
//! type-checked and handed to the engine, which accepts them without effect.

use std::collections::BTreeMap;

use emberdb::{Options, WriteOptions};

use crate::error::Error;
use crate::snapshot::Snapshot;
use crate::value::Value;

type Fields = BTreeMap<String, Value>;

fn fields<'a>(value: &'a Value, what: &str) -> Result<Option<&'a Fields>, Error> {
    match value {
        Value::Undefined | Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(Error::bad_argument(format!(
            "{what} must be an object, got {}",
            other.type_name()
        ))),
    }
}

/// Looks up `key`, treating `undefined` and `null` like a missing key.
fn present<'a>(fields: &'a Fields, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_absent())
}

fn bool_field(fields: &Fields, key: &str) -> Result<Option<bool>, Error> {
    match present(fields, key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(Error::bad_argument(format!(
            "option {key} must be a boolean, got {}",
            other.type_name()
        ))),
    }
}

fn size_field(fields: &Fields, key: &str) -> Result<Option<usize>, Error> {
    match present(fields, key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                Error::bad_argument(format!(
                    "option {key} must be a non-negative integer, got {value:?}"
                ))
            }),
    }
}

/// Decodes the options of `open`, `destroy` and `repair`.
pub(crate) fn decode_options(value: &Value) -> Result<Options, Error> {
    let mut options = Options::default();
    let Some(fields) = self::fields(value, "options")? else {
        return Ok(options);
    };

    if let Some(v) = bool_field(fields, "createIfMissing")? {
        options.create_if_missing = v;
    }
    if let Some(v) = bool_field(fields, "errorIfExists")? {
        options.error_if_exists = v;
    }
    if let Some(v) = bool_field(fields, "paranoidChecks")? {
        options.paranoid_checks = v;
    }
    if let Some(v) = size_field(fields, "writeBufferSize")? {
        options.write_buffer_size = v;
    }
    if let Some(v) = size_field(fields, "maxOpenFiles")? {
        options.max_open_files = v;
    }
    if let Some(v) = size_field(fields, "blockSize")? {
        options.block_size = v;
    }
    if let Some(v) = size_field(fields, "blockRestartInterval")? {
        options.block_restart_interval = v;
    }
    if let Some(v) = size_field(fields, "blockCache")? {
        options.block_cache_capacity = Some(v);
    }
    if let Some(v) = bool_field(fields, "compression")? {
        options.compression = v;
    }
    match present(fields, "comparator") {
        None => {}
        Some(Value::Comparator(comparator)) => options.comparator = Some(comparator.clone()),
        Some(other) => {
            return Err(Error::bad_argument(format!(
                "option comparator must be a comparator, got {}",
                other.type_name()
            )))
        }
    }
    Ok(options)
}

/// Read options as given by the host. The snapshot is still a host handle;
/// the database checks it belongs to it before reading through it.
#[derive(Clone, Debug, Default)]
pub(crate) struct HostReadOptions {
    pub(crate) verify_checksums: bool,
    pub(crate) fill_cache: bool,
    pub(crate) snapshot: Option<Snapshot>,
}

pub(crate) fn decode_read_options(value: &Value) -> Result<HostReadOptions, Error> {
    let defaults = emberdb::ReadOptions::new();
    let mut options = HostReadOptions {
        verify_checksums: defaults.verify_checksums,
        fill_cache: defaults.fill_cache,
        snapshot: None,
    };
    let Some(fields) = self::fields(value, "read options")? else {
        return Ok(options);
    };

    if let Some(v) = bool_field(fields, "verifyChecksums")? {
        options.verify_checksums = v;
    }
    if let Some(v) = bool_field(fields, "fillCache")? {
        options.fill_cache = v;
    }
    match present(fields, "snapshot") {
        None => {}
        Some(Value::Snapshot(snapshot)) => options.snapshot = Some(snapshot.clone()),
        Some(other) => {
            return Err(Error::bad_argument(format!(
                "option snapshot must be a snapshot, got {}",
                other.type_name()
            )))
        }
    }
    Ok(options)
}

pub(crate) fn decode_write_options(value: &Value) -> Result<WriteOptions, Error> {
    let mut options = WriteOptions::default();
    if let Some(fields) = self::fields(value, "write options")? {
        if let Some(v) = bool_field(fields, "sync")? {
            options.sync = v;
        }
    }
    Ok(options)
}
