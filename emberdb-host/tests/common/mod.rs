#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use emberdb_host::{open, Database, Error, HostConfig, HostLoop, Value};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn host() -> HostLoop {
    init_tracing();
    HostLoop::new(&HostConfig {
        worker_threads: 4,
        ..Default::default()
    })
    .unwrap()
}

/// A database path inside a fresh temporary directory.
pub fn db_path(dir: &TempDir) -> Value {
    Value::from(dir.path().join("db").to_str().unwrap())
}

pub fn create_options() -> Value {
    Value::object([("createIfMissing", Value::from(true))])
}

/// Receives one callback result.
pub struct Slot<T> {
    inner: Rc<RefCell<Option<Result<T, Error>>>>,
}

impl<T: 'static> Slot<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(None)),
        }
    }

    pub fn sink(&self) -> impl FnOnce(Result<T, Error>) + 'static {
        let inner = self.inner.clone();
        move |result| {
            let previous = inner.borrow_mut().replace(result);
            assert!(previous.is_none(), "callback fired twice");
        }
    }

    pub fn boxed(&self) -> Box<dyn FnOnce(Result<T, Error>)> {
        Box::new(self.sink())
    }

    pub fn take(&self) -> Result<T, Error> {
        self.inner
            .borrow_mut()
            .take()
            .expect("callback did not fire")
    }
}

pub fn open_db(host: &HostLoop, path: &Value) -> Database {
    let slot = Slot::new();
    open(host, path, &create_options(), slot.sink()).unwrap();
    host.run();
    slot.take().unwrap()
}

pub fn put_all(db: &Database, entries: &[(&str, &str)]) {
    let batch = emberdb_host::WriteBatch::new();
    for (key, value) in entries {
        batch
            .put(&Value::from(key.as_bytes()), &Value::from(value.as_bytes()))
            .unwrap();
    }
    let slot = Slot::new();
    db.write(&batch, &Value::Undefined, slot.sink()).unwrap();
    db.host().run();
    slot.take().unwrap();
}

pub fn get(db: &Database, key: &str, options: &Value) -> Option<String> {
    let slot = Slot::new();
    db.get(&Value::from(key.as_bytes()), options, slot.sink())
        .unwrap();
    db.host().run();
    slot.take()
        .unwrap()
        .map(|value| String::from_utf8(value.to_vec()).unwrap())
}
