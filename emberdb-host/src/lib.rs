#![cfg_attr(test, allow(clippy::unwrap_used))]
#![warn(clippy::panic)]
#![cfg_attr(test, allow(clippy::panic))]
#![allow(clippy::result_large_err)]

//! Asynchronous host bindings for emberdb.
//!
//! A [`HostLoop`] owns a worker pool. Database calls validate their
//! arguments on the calling thread, run the engine work on a worker, and
//! deliver the result to a callback from [`HostLoop::run`] on the thread
//! that owns the loop.
//!
//! ```no_run
//! use emberdb_host::{open, HostConfig, HostLoop, Value};
//!
//! let host = HostLoop::new(&HostConfig::load()?)?;
//! let options = Value::object([("createIfMissing", Value::from(true))]);
//! open(&host, &Value::from("/tmp/ember"), &options, |db| {
//!     let db = db.expect("open");
//!     db.get(&Value::from(b"key"), &Value::Undefined, |value| {
//!         println!("{:?}", value);
//!     })
//!     .expect("valid arguments");
//! })?;
//! host.run();
//! # Ok::<(), emberdb_host::Error>(())
//! ```

pub use batch::WriteBatch;
pub use config::HostConfig;
pub use database::{destroy, open, repair, Database};
pub use error::{Error, ErrorKind, Status};
pub use host::{FatalHandler, HostLoop};
pub use iterator::DbIterator;
pub use op::Callback;
pub use slice::{materialize, view, PinSet, PinnedBuffer};
pub use snapshot::Snapshot;
pub use value::Value;

/// Re-export of the engine's comparator types, for custom orderings.
pub use emberdb::{BytewiseComparator, Comparator, ComparatorRef};

mod batch;
mod config;
mod database;
mod error;
mod host;
mod iterator;
mod op;
mod options;
mod slice;
mod snapshot;
mod value;

/// The engine version this binding was built against, as `major.minor`.
pub fn binding_version() -> String {
    format!("{}.{}", emberdb::MAJOR_VERSION, emberdb::MINOR_VERSION)
}
