mod common;

use common::{create_options, db_path, get, host, open_db, put_all, Slot};
use emberdb_host::{destroy, open, repair, DbIterator, ErrorKind, Snapshot, Value, WriteBatch};
use tempfile::tempdir;

#[test]
fn test_reopen_keeps_data() {
    let host = host();
    let dir = tempdir().unwrap();
    let path = db_path(&dir);

    let db = open_db(&host, &path);
    put_all(&db, &[("durable", "yes")]);
    db.close();

    let db = open_db(&host, &path);
    assert_eq!(get(&db, "durable", &Value::Undefined), Some("yes".to_string()));
}

#[test]
fn test_destroy_waits_for_every_child() {
    let host = host();
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    let db = open_db(&host, &path);
    put_all(&db, &[("k", "v")]);

    let it_slot: Slot<DbIterator> = Slot::new();
    db.iterator(&Value::Undefined, it_slot.sink()).unwrap();
    let snap_slot: Slot<Snapshot> = Slot::new();
    db.snapshot(snap_slot.sink());
    host.run();
    let it = it_slot.take().unwrap();
    let snapshot = snap_slot.take().unwrap();
    assert_eq!(db.live_children(), 2);

    let destroy_now = || {
        let slot = Slot::new();
        destroy(&host, &path, &Value::Undefined, Some(slot.boxed())).unwrap();
        host.run();
        slot.take()
    };

    // The handle is gone but its children still hold the database open.
    db.close();
    assert_eq!(destroy_now().unwrap_err().kind(), ErrorKind::DestroyFailed);

    drop(it);
    assert_eq!(destroy_now().unwrap_err().kind(), ErrorKind::DestroyFailed);

    drop(snapshot);
    destroy_now().unwrap();

    let slot = Slot::new();
    open(&host, &path, &Value::Undefined, slot.sink()).unwrap();
    host.run();
    assert_eq!(slot.take().unwrap_err().kind(), ErrorKind::OpenFailed);
}

#[test]
fn test_children_count_tracks_drops() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    let slots: Vec<Slot<Snapshot>> = (0..3).map(|_| Slot::new()).collect();
    for slot in &slots {
        db.snapshot(slot.sink());
    }
    host.run();
    let snapshots: Vec<Snapshot> = slots.iter().map(|s| s.take().unwrap()).collect();
    assert_eq!(db.live_children(), 3);

    let copy = snapshots[0].clone();
    assert!(copy.same_as(&snapshots[0]));
    drop(snapshots);
    assert_eq!(db.live_children(), 1);
    drop(copy);
    assert_eq!(db.live_children(), 0);
}

#[test]
fn test_destroy_without_callback() {
    let host = host();
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    open_db(&host, &path).close();

    destroy(&host, &path, &Value::Undefined, None).unwrap();
    host.run();
    assert!(!dir.path().join("db").exists());
}

#[test]
fn test_repair() {
    let host = host();
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    let db = open_db(&host, &path);
    put_all(&db, &[("a", "1")]);
    db.close();

    let slot = Slot::new();
    repair(&host, &path, &Value::Undefined, Some(slot.boxed())).unwrap();
    host.run();
    slot.take().unwrap();

    let db = open_db(&host, &path);
    assert_eq!(get(&db, "a", &Value::Undefined), Some("1".to_string()));
    db.close();

    let missing = Value::from(dir.path().join("nowhere").to_str().unwrap());
    let slot = Slot::new();
    repair(&host, &missing, &Value::Undefined, Some(slot.boxed())).unwrap();
    host.run();
    assert_eq!(slot.take().unwrap_err().kind(), ErrorKind::RepairFailed);
}

#[test]
fn test_lifecycle_calls_reject_bad_arguments() {
    let host = host();
    let dir = tempdir().unwrap();
    let path = db_path(&dir);

    for call in [destroy, repair] {
        let err = call(&host, &Value::Null, &Value::Undefined, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
        let err = call(&host, &path, &Value::from("options"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
    }
    assert_eq!(host.pending(), 0);
}

#[test]
fn test_second_open_of_same_path_fails() {
    let host = host();
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    let _db = open_db(&host, &path);

    let slot = Slot::new();
    open(&host, &path, &create_options(), slot.sink()).unwrap();
    host.run();
    assert_eq!(slot.take().unwrap_err().kind(), ErrorKind::OpenFailed);
}

#[test]
fn test_concurrent_writes_of_one_batch() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    let batch = WriteBatch::new();
    batch.put(&Value::from(b"k"), &Value::from(b"v")).unwrap();

    let slots: Vec<Slot<()>> = (0..4).map(|_| Slot::new()).collect();
    for slot in &slots {
        db.write(&batch, &Value::Undefined, slot.sink()).unwrap();
    }
    assert!(batch.in_use());
    let err = batch.put(&Value::from(b"x"), &Value::from(b"y")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchInUse);
    assert_eq!(err.kind().to_string(), "BatchInUse");

    host.run();
    for slot in &slots {
        slot.take().unwrap();
    }
    assert!(!batch.in_use());
    batch.clear().unwrap();
    assert_eq!(get(&db, "k", &Value::Undefined), Some("v".to_string()));
}

#[test]
fn test_write_callback_may_reuse_batch() {
    let host = host();
    let dir = tempdir().unwrap();
    let db = open_db(&host, &db_path(&dir));

    let batch = WriteBatch::new();
    batch.put(&Value::from(b"first"), &Value::from(b"1")).unwrap();

    let reused = Slot::new();
    let sink = reused.sink();
    let inner = batch.clone();
    db.write(&batch, &Value::Undefined, move |result| {
        result.unwrap();
        let cleared = inner.clear();
        sink(cleared);
    })
    .unwrap();
    host.run();

    reused.take().unwrap();
    assert!(batch.is_empty());
}
