mod common;

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use common::{create_options, db_path, get, host, open_db, put_all, Slot};
use emberdb_host::{
    open, Comparator, ComparatorRef, DbIterator, ErrorKind, Snapshot, Status, Value, WriteBatch,
};
use rstest::rstest;
use tempfile::tempdir;

#[test]
fn test_put_then_get() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    put_all(&db, &[("apple", "red"), ("banana", "yellow"), ("empty", "")]);

    assert_eq!(get(&db, "apple", &Value::Undefined), Some("red".to_string()));
    assert_eq!(get(&db, "banana", &Value::Null), Some("yellow".to_string()));
    assert_eq!(get(&db, "empty", &Value::Undefined), Some(String::new()));
}

#[test]
fn test_missing_key_is_not_an_error() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    assert_eq!(get(&db, "ghost", &Value::Undefined), None);
}

#[test]
fn test_delete_hides_key() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("k", "v")]);

    let batch = WriteBatch::new();
    batch.delete(&Value::from(b"k")).unwrap();
    let slot = Slot::new();
    db.write(&batch, &Value::object([("sync", Value::from(true))]), slot.sink())
        .unwrap();
    host.run();
    slot.take().unwrap();

    assert_eq!(get(&db, "k", &Value::Undefined), None);
}

#[rstest]
#[case(Value::from("key"))]
#[case(Value::Undefined)]
#[case(Value::Integer(1))]
fn test_get_rejects_non_buffer_key(#[case] key: Value) {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    let slot: Slot<Option<Bytes>> = Slot::new();
    let err = db.get(&key, &Value::Undefined, slot.sink()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);
    assert!(err.to_string().starts_with("TypeError: Invalid arguments"));
    assert_eq!(host.pending(), 0);
}

#[test]
fn test_open_missing_without_create_fails() {
    let host = host();
    let dir = tempdir().unwrap();

    let slot = Slot::new();
    open(&host, &db_path(&dir), &Value::Undefined, slot.sink()).unwrap();
    host.run();
    let err = slot.take().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailed);
    assert_eq!(err.status(), Some(Status::InvalidArgument));
}

#[test]
fn test_open_rejects_bad_arguments() {
    let host = host();
    let dir = tempdir().unwrap();

    let slot = Slot::new();
    let err = open(&host, &Value::from(b"/tmp/db"), &create_options(), slot.sink()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);

    let slot = Slot::new();
    let options = Value::object([("createIfMissing", Value::from("yes"))]);
    let err = open(&host, &db_path(&dir), &options, slot.sink()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);
    assert_eq!(host.pending(), 0);
}

#[test]
fn test_unsupported_option_fails_open_with_status() {
    let host = host();
    let dir = tempdir().unwrap();
    let options = Value::object([
        ("createIfMissing", Value::from(true)),
        ("compression", Value::from(true)),
    ]);

    let slot = Slot::new();
    open(&host, &db_path(&dir), &options, slot.sink()).unwrap();
    host.run();
    let err = slot.take().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailed);
    assert_eq!(err.status(), Some(Status::NotSupported));
    assert!(err.to_string().starts_with("OpenFailed: "));
}

#[test]
fn test_snapshot_isolates_reads() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("k", "v1")]);

    let slot: Slot<Snapshot> = Slot::new();
    db.snapshot(slot.sink());
    host.run();
    let snapshot = slot.take().unwrap();

    put_all(&db, &[("k", "v2"), ("new", "x")]);

    let at_snapshot = Value::object([("snapshot", Value::from(snapshot.clone()))]);
    assert_eq!(get(&db, "k", &at_snapshot), Some("v1".to_string()));
    assert_eq!(get(&db, "new", &at_snapshot), None);
    assert_eq!(get(&db, "k", &Value::Undefined), Some("v2".to_string()));
}

#[test]
fn test_snapshot_from_other_database_is_rejected() {
    let host = host();
    let (dir_a, dir_b) = (tempdir().unwrap(), tempdir().unwrap());
    let db_a = open_db(&host, &db_path(&dir_a));
    let db_b = open_db(&host, &db_path(&dir_b));

    let slot: Slot<Snapshot> = Slot::new();
    db_a.snapshot(slot.sink());
    host.run();
    let snapshot = slot.take().unwrap();

    let options = Value::object([("snapshot", Value::from(snapshot))]);
    let slot: Slot<Option<Bytes>> = Slot::new();
    let err = db_b
        .get(&Value::from(b"k"), &options, slot.sink())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);
}

fn iterator(db: &emberdb_host::Database, options: &Value) -> DbIterator {
    let slot = Slot::new();
    db.iterator(options, slot.sink()).unwrap();
    db.host().run();
    slot.take().unwrap()
}

fn keys(it: &mut DbIterator) -> Vec<Bytes> {
    let mut keys = Vec::new();
    it.seek_to_first();
    while it.valid() {
        keys.push(it.key().unwrap());
        it.next();
    }
    keys
}

#[test]
fn test_iterator_walks_in_order() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("c", "3"), ("a", "1"), ("b", "2")]);

    let mut it = iterator(&db, &Value::Undefined);
    assert!(!it.valid());
    assert_eq!(keys(&mut it), vec!["a", "b", "c"]);

    it.seek(&Value::from(b"b")).unwrap();
    assert_eq!(it.key().as_deref(), Some(b"b".as_slice()));
    assert_eq!(it.value().as_deref(), Some(b"2".as_slice()));
    it.prev();
    assert_eq!(it.key().as_deref(), Some(b"a".as_slice()));
    it.prev();
    assert!(!it.valid());

    it.seek_to_last();
    assert_eq!(it.key().as_deref(), Some(b"c".as_slice()));
    it.next();
    assert!(!it.valid());
    assert!(it.key().is_none());
    it.status().unwrap();

    assert_eq!(
        it.seek(&Value::from("b")).unwrap_err().kind(),
        ErrorKind::BadArgument
    );
}

#[test]
fn test_iterator_does_not_see_later_writes() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("a", "1")]);

    let mut it = iterator(&db, &Value::Undefined);
    put_all(&db, &[("b", "2")]);

    assert_eq!(keys(&mut it), vec!["a"]);
}

struct ReverseComparator;

impl Comparator for ReverseComparator {
    fn name(&self) -> &str {
        "test.ReverseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }
}

#[test]
fn test_custom_comparator_orders_keys() {
    let host = host();
    let dir = tempdir().unwrap();
    let comparator: ComparatorRef = Arc::new(ReverseComparator);
    let options = Value::object([
        ("createIfMissing", Value::from(true)),
        ("comparator", Value::from(comparator.clone())),
    ]);

    let slot = Slot::new();
    open(&host, &db_path(&dir), &options, slot.sink()).unwrap();
    host.run();
    let db = slot.take().unwrap();
    assert!(Arc::ptr_eq(db.comparator().unwrap(), &comparator));

    put_all(&db, &[("a", "1"), ("c", "3"), ("b", "2")]);
    let mut it = iterator(&db, &Value::Undefined);
    assert_eq!(keys(&mut it), vec!["c", "b", "a"]);
}

#[test]
fn test_properties() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("a", "1"), ("b", "2"), ("c", "3")]);

    let property = |name: &str| {
        let slot = Slot::new();
        db.property(&Value::from(name), slot.sink()).unwrap();
        host.run();
        slot.take().unwrap()
    };
    assert_eq!(property("emberdb.num-entries").as_deref(), Some("3"));
    assert!(property("emberdb.stats")
        .unwrap()
        .contains("db/batches_written 1"));
    assert_eq!(property("emberdb.no-such-property"), None);
    assert_eq!(property("leveldb.stats"), None);

    let slot: Slot<Option<String>> = Slot::new();
    let err = db.property(&Value::from(b"name"), slot.sink()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);
}

#[test]
fn test_approximate_sizes() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("a", "1"), ("b", "2"), ("x", "3")]);

    let slot = Slot::new();
    let bounds = Value::from(vec![
        Value::from(b"a"),
        Value::from(b"c"),
        Value::from(b"m"),
        Value::from(b"n"),
    ]);
    db.approximate_sizes(&bounds, slot.sink()).unwrap();
    host.run();
    let sizes = slot.take().unwrap();
    assert_eq!(sizes.len(), 2);
    assert!(matches!(sizes[0], Value::Integer(n) if n > 0));
    assert_eq!(sizes[1], Value::Integer(0));

    let slot = Slot::new();
    db.approximate_sizes(&Value::from(Vec::<Value>::new()), slot.sink())
        .unwrap();
    host.run();
    assert!(slot.take().unwrap().is_empty());
}

#[rstest]
#[case(Value::from(vec![Value::from(b"a")]))]
#[case(Value::from(vec![Value::from(b"a"), Value::from("z")]))]
#[case(Value::from(b"a"))]
fn test_approximate_sizes_rejects_malformed_ranges(#[case] bounds: Value) {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    let slot: Slot<Vec<Value>> = Slot::new();
    let err = db.approximate_sizes(&bounds, slot.sink()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);
    assert_eq!(host.pending(), 0);
}

#[test]
fn test_compact_range_keeps_latest_values() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));
    put_all(&db, &[("k", "v1"), ("j", "x")]);
    put_all(&db, &[("k", "v2")]);

    let slot = Slot::new();
    db.compact_range(&Value::Undefined, &Value::Null, Some(slot.boxed()))
        .unwrap();
    host.run();
    slot.take().unwrap();

    let slot = Slot::new();
    db.compact_range(&Value::from(b"a"), &Value::from(b"z"), Some(slot.boxed()))
        .unwrap();
    db.compact_range(&Value::from(b"k"), &Value::Undefined, None)
        .unwrap();
    host.run();
    slot.take().unwrap();

    assert_eq!(get(&db, "k", &Value::Undefined), Some("v2".to_string()));
    assert_eq!(get(&db, "j", &Value::Undefined), Some("x".to_string()));

    let err = db
        .compact_range(&Value::from("a"), &Value::Undefined, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadArgument);
}

#[test]
fn test_callback_panic_reaches_fatal_handler() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    let caught = std::rc::Rc::new(std::cell::Cell::new(false));
    let flag = caught.clone();
    host.set_fatal_handler(move |_| flag.set(true));

    db.get(&Value::from(b"k"), &Value::Undefined, |_| panic!("callback failed"))
        .unwrap();
    host.run();
    assert!(caught.get());

    // The loop keeps working afterwards.
    assert_eq!(get(&db, "k", &Value::Undefined), None);
}

#[test]
fn test_binding_version() {
    assert_eq!(
        emberdb_host::binding_version(),
        format!("{}.{}", emberdb::MAJOR_VERSION, emberdb::MINOR_VERSION)
    );
}

#[test]
fn test_gets_overlapping_writes_see_existing_key() {
    let host = host();
    let dir = tempdir().unwrap();
    let options = Value::object([
        ("createIfMissing", Value::from(true)),
        ("writeBufferSize", Value::from(1)),
    ]);
    let slot = Slot::new();
    open(&host, &db_path(&dir), &options, slot.sink()).unwrap();
    host.run();
    let db = slot.take().unwrap();
    put_all(&db, &[("k", "0")]);

    let mut writes = Vec::new();
    let mut gets = Vec::new();
    for i in 0..200 {
        let batch = WriteBatch::new();
        batch
            .put(&Value::from(b"k"), &Value::from(i.to_string().as_bytes()))
            .unwrap();
        let write: Slot<()> = Slot::new();
        db.write(&batch, &Value::Undefined, write.sink()).unwrap();
        writes.push(write);

        let read: Slot<Option<Bytes>> = Slot::new();
        db.get(&Value::from(b"k"), &Value::Undefined, read.sink())
            .unwrap();
        gets.push(read);
    }
    host.run();

    for write in &writes {
        write.take().unwrap();
    }
    for read in &gets {
        assert!(read.take().unwrap().is_some());
    }
}
