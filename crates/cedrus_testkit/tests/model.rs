//! Model check: a store behaves like a `HashMap` under any sequence of
//! single-key operations, before and after reopening.

use cedrus_testkit::{batch_strategy, op_sequence_strategy, StoreOp, TestStore};
use proptest::prelude::*;
use std::collections::HashMap;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn store_matches_hash_map(ops in op_sequence_strategy(64)) {
        let store = TestStore::new();
        let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                StoreOp::Put(key, value) => {
                    let existed = model.insert(key.clone(), value.clone()).is_some();
                    let outcome = store.put(&key, &value).unwrap();
                    prop_assert_eq!(outcome == cedrus_core::PutOutcome::Updated, existed);
                }
                StoreOp::Delete(key) => match store.delete(&key) {
                    Ok(()) => prop_assert!(model.remove(&key).is_some()),
                    Err(e) => {
                        prop_assert!(e.is_not_found());
                        prop_assert!(!model.contains_key(&key));
                    }
                },
                StoreOp::Get(key) => match store.get(&key) {
                    Ok(handle) => prop_assert_eq!(handle.bytes(), model.get(&key).map(Vec::as_slice)),
                    Err(e) => {
                        prop_assert!(e.is_not_found());
                        prop_assert!(!model.contains_key(&key));
                    }
                },
            }
        }

        let store = store.reopen();
        prop_assert_eq!(store.len(), model.len());
        for (key, value) in &model {
            let handle = store.get(key).unwrap();
            prop_assert_eq!(handle.bytes(), Some(value.as_slice()));
        }
        prop_assert!(store.check_integrity().is_ok());
    }

    #[test]
    fn committed_batch_is_fully_visible(entries in batch_strategy(24)) {
        let store = TestStore::new();
        let mut batch = store.new_write_batch().unwrap();
        for (key, value) in &entries {
            batch.put(key, value).unwrap();
        }
        batch.commit().unwrap();
        drop(batch);

        prop_assert_eq!(store.len(), entries.len());
        for (key, value) in &entries {
            let handle = store.get(key).unwrap();
            prop_assert_eq!(handle.bytes(), Some(value.as_slice()));
        }
    }
}
