mod common;

use std::collections::BTreeMap;

use common::{db_path, host, open_db, Slot};
use emberdb_host::{DbIterator, Value, WriteBatch};
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_written_entries_read_back(
        entries in prop::collection::btree_map(
            prop::collection::vec(any::<u8>(), 0..16),
            prop::collection::vec(any::<u8>(), 0..64),
            0..32,
        )
    ) {
        let host = host();
        let dir = tempdir().unwrap();
        let db = open_db(&host, &db_path(&dir));

        let batch = WriteBatch::new();
        for (key, value) in &entries {
            batch.put(&Value::from(key.clone()), &Value::from(value.clone())).unwrap();
        }
        let slot = Slot::new();
        db.write(&batch, &Value::Undefined, slot.sink()).unwrap();
        host.run();
        slot.take().unwrap();

        for (key, value) in &entries {
            let slot = Slot::new();
            db.get(&Value::from(key.clone()), &Value::Undefined, slot.sink()).unwrap();
            host.run();
            let got = slot.take().unwrap();
            prop_assert_eq!(got.as_deref(), Some(value.as_slice()));
        }

        let slot: Slot<DbIterator> = Slot::new();
        db.iterator(&Value::Undefined, slot.sink()).unwrap();
        host.run();
        let mut it = slot.take().unwrap();
        let mut seen = BTreeMap::new();
        it.seek_to_first();
        while it.valid() {
            seen.insert(it.key().unwrap().to_vec(), it.value().unwrap().to_vec());
            it.next();
        }
        prop_assert_eq!(seen, entries);
    }
}
