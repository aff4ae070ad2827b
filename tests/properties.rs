//! Property Tests
//!
//! Patch idempotence and instance id uniqueness.

use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use shellconf::{ConfigStore, SettingsDocument};

fn store() -> ConfigStore {
    let mut store = ConfigStore::new();
    store.load_document(
        serde_json::from_value(json!({
            "byWidget": {"toolbar": {"height": 30, "items": ["clock"]}}
        }))
        .unwrap(),
    );
    store
}

fn setting_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::String),
        prop::collection::vec("[a-z]{1,4}", 0..4).prop_map(|v| json!(v)),
    ]
}

fn partial() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,6}", setting_value(), 0..6)
        .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn patch_is_idempotent(partial in partial()) {
        let mut once = store();
        once.patch("byWidget.toolbar", Value::Object(partial.clone())).unwrap();
        let after_once = once.get().unwrap();

        once.patch("byWidget.toolbar", Value::Object(partial)).unwrap();
        prop_assert_eq!(&*once.get().unwrap(), &*after_once);
    }

    #[test]
    fn patch_then_restore_returns_to_snapshot(partial in partial()) {
        let mut store = store();
        let snapshot: SettingsDocument = (*store.get().unwrap()).clone();

        store.patch("byWidget.toolbar", Value::Object(partial)).unwrap();
        store.restore_to_last_loaded().unwrap();

        prop_assert_eq!(&*store.get().unwrap(), &snapshot);
        prop_assert!(!store.is_dirty());
    }
}

#[test]
fn test_thousand_instances_are_distinct() {
    let mut store = store();
    let mut seen = HashSet::new();
    for _ in 0..1000 {
        let id = store.create_instance("toolbar").unwrap();
        assert!(seen.insert(id), "duplicate instance id");
    }

    let doc = store.get().unwrap();
    assert_eq!(doc.by_widget["toolbar"].instance_ids().count(), 1000);
}
