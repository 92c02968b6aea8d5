//! Options for opening, reading from and writing to a database.

use crate::comparator::{default_comparator, ComparatorRef};
use crate::error::EmberError;
use crate::snapshot::Snapshot;

/// Options used when a database is opened, destroyed or repaired.
///
/// The engine serves reads from memory and keeps a single journal file, so
/// the block and file tuning fields (`max_open_files`, `block_size`,
/// `block_restart_interval`, `block_cache_capacity`) are validated and
/// otherwise ignored.
#[derive(Clone, Debug)]
pub struct Options {
    /// Create the database if it does not exist yet.
    pub create_if_missing: bool,
    /// Fail to open if the database already exists.
    pub error_if_exists: bool,
    /// Treat any journal damage as fatal instead of dropping the damaged tail.
    pub paranoid_checks: bool,
    /// Bytes of journal written between automatic journal compactions.
    pub write_buffer_size: usize,
    /// Upper bound on files the engine keeps open. Validated, not used.
    pub max_open_files: usize,
    /// Target size of a data block. Validated, not used.
    pub block_size: usize,
    /// Keys between restart points in a data block. Validated, not used.
    pub block_restart_interval: usize,
    /// Block cache capacity in bytes. There is no block cache; accepted and
    /// ignored.
    pub block_cache_capacity: Option<usize>,
    /// Compress data blocks.
    pub compression: bool,
    /// Key ordering. `None` selects the bytewise comparator.
    pub comparator: Option<ComparatorRef>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024,
            max_open_files: 1000,
            block_size: 4 * 1024,
            block_restart_interval: 16,
            block_cache_capacity: None,
            compression: false,
            comparator: None,
        }
    }
}

impl Options {
    pub(crate) fn comparator(&self) -> ComparatorRef {
        self.comparator.clone().unwrap_or_else(default_comparator)
    }

    pub(crate) fn validate(&self) -> Result<(), EmberError> {
        if self.compression {
            return Err(EmberError::CompressionUnsupported);
        }
        if self.write_buffer_size == 0 {
            return Err(EmberError::InvalidOption {
                name: "write_buffer_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.block_size == 0 {
            return Err(EmberError::InvalidOption {
                name: "block_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.block_restart_interval == 0 {
            return Err(EmberError::InvalidOption {
                name: "block_restart_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_open_files < 10 {
            return Err(EmberError::InvalidOption {
                name: "max_open_files",
                reason: format!("must be at least 10, got {}", self.max_open_files),
            });
        }
        Ok(())
    }
}

/// Options that control a read.
#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    /// Verify checksums of everything read on behalf of this call. Journal
    /// records are verified once, at open; reads come from memory and have
    /// nothing further to check, so this is accepted and ignored.
    pub verify_checksums: bool,
    /// Populate caches with data read on behalf of this call. There are no
    /// read caches; accepted and ignored.
    pub fill_cache: bool,
    /// Read as of this snapshot instead of the latest state.
    pub snapshot: Option<Snapshot>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            snapshot: None,
        }
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options that control a write.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    /// Wait until the journal is flushed to stable storage.
    pub sync: bool,
}
