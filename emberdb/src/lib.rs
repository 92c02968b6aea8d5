#![cfg_attr(test, allow(clippy::unwrap_used))]
#![warn(clippy::panic)]
#![cfg_attr(test, allow(clippy::panic))]
#![allow(clippy::result_large_err)]

//! An embedded, ordered key-value store.
//!
//! Keys and values are arbitrary byte strings. Keys are kept in the order
//! of a [`Comparator`] chosen when the database is created. Writes are
//! grouped into atomic [`WriteBatch`]es and logged to a checksummed journal
//! before they become visible; reads can be pinned to a [`Snapshot`].

/// Re-export the bytes crate.
///
/// Keys and values cross the API as [`bytes::Bytes`].
pub use bytes;

pub use batch::WriteBatch;
pub use comparator::{BytewiseComparator, Comparator, ComparatorRef};
pub use config::{Options, ReadOptions, WriteOptions};
pub use db::{destroy, repair, Db, Range};
pub use db_iter::DbIterator;
pub use error::{Error, ErrorKind};
pub use snapshot::Snapshot;

pub mod config;
pub mod db_stats;

mod batch;
mod comparator;
mod db;
mod db_iter;
mod error;
mod journal;
mod mem_table;
mod snapshot;

/// Major version of the on-disk format and API.
pub const MAJOR_VERSION: u32 = 0;

/// Minor version of the on-disk format and API.
pub const MINOR_VERSION: u32 = 3;
