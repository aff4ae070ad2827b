//! Referential Integrity Tests
//!
//! Collection deletion, catalog pruning and dangling-reference repair as seen
//! through ConfigStore.

use serde_json::json;
use shellconf::{
    CatalogFeed, ConfigStore, Reference, ResourceKind, SettingsDocument, StoreError,
    WallpaperTarget,
};

fn document() -> SettingsDocument {
    serde_json::from_value(json!({
        "collections": [
            {"id": "C", "name": "Nature", "resources": ["w1", "w2"]},
            {"id": "D", "name": "City", "resources": ["w3"]}
        ],
        "wallpaperCollection": "C",
        "monitors": {
            "M1": {"wallpaperCollection": "C"},
            "M2": {
                "wallpaperCollection": "D",
                "byWorkspace": {
                    "ws1": {"wallpaperCollection": "C"},
                    "ws2": {"wallpaperCollection": "D"}
                }
            }
        },
        "activeThemes": ["A", "B", "C"],
        "activeIconPacks": ["system", "papirus"]
    }))
    .unwrap()
}

fn store() -> ConfigStore {
    let mut store = ConfigStore::new();
    store.load_document(document());
    store
}

// =============================================================================
// Collection deletion
// =============================================================================

#[test]
fn test_delete_collection_nulls_all_references() {
    let mut store = store();
    let detached = store.delete_collection("C").unwrap();
    assert_eq!(detached.len(), 3);

    let doc = store.get().unwrap();
    assert!(!doc.has_collection("C"));
    assert_eq!(doc.wallpaper_collection, None);
    assert_eq!(doc.monitors["M1"].wallpaper_collection, None);
    assert_eq!(doc.monitors["M2"].by_workspace["ws1"].wallpaper_collection, None);

    // Unrelated references survive
    assert_eq!(doc.monitors["M2"].wallpaper_collection.as_deref(), Some("D"));
    assert_eq!(
        doc.monitors["M2"].by_workspace["ws2"].wallpaper_collection.as_deref(),
        Some("D")
    );
}

#[test]
fn test_delete_collection_is_one_commit() {
    let mut store = store();
    let revision = store.revision().unwrap();
    store.delete_collection("C").unwrap();
    assert_eq!(store.revision(), Some(revision + 1));
}

#[test]
fn test_delete_unknown_collection() {
    let mut store = store();
    let before = store.get().unwrap();
    assert!(matches!(
        store.delete_collection("Z"),
        Err(StoreError::UnknownCollection(_))
    ));
    assert_eq!(*store.get().unwrap(), *before);
}

#[test]
fn test_patch_dropping_collection_cascades() {
    let mut store = store();
    store
        .patch(
            "",
            json!({"collections": [{"id": "D", "name": "City", "resources": ["w3"]}]}),
        )
        .unwrap();

    let doc = store.get().unwrap();
    assert_eq!(doc.wallpaper_collection, None);
    assert_eq!(doc.monitors["M1"].wallpaper_collection, None);
}

#[test]
fn test_assigning_unknown_collection_rejected() {
    let mut store = store();
    let err = store
        .set_wallpaper_collection(&WallpaperTarget::Monitor("M1".to_string()), Some("Z"))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownCollection(_)));

    let err = store
        .patch("monitors.M1", json!({"wallpaperCollection": "Z"}))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn test_created_collection_can_be_assigned_and_deleted() {
    let mut store = store();
    let id = store
        .create_collection("Space", vec!["w9".to_string()])
        .unwrap();
    store
        .set_wallpaper_collection(
            &WallpaperTarget::Workspace {
                monitor_id: "M3".to_string(),
                workspace_id: "ws1".to_string(),
            },
            Some(&id),
        )
        .unwrap();
    assert_eq!(
        store.resolve_wallpaper_collection("M3", Some("ws1")).unwrap(),
        Some(id.clone())
    );

    store.delete_collection(&id).unwrap();
    assert_eq!(
        store.resolve_wallpaper_collection("M3", Some("ws1")).unwrap().as_deref(),
        Some("C"),
        "falls back to the global default"
    );
}

// =============================================================================
// Catalog pruning
// =============================================================================

#[test]
fn test_theme_prune_preserves_order() {
    let mut store = store();
    let pruned = store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Theme, ["A", "C", "X"]));

    assert_eq!(pruned, vec![Reference::Theme("B".to_string())]);
    assert_eq!(store.get().unwrap().active_themes, vec!["A", "C"]);
    assert!(!store.is_dirty(), "catalog prune is not a user edit");
    assert!(store.needs_save(), "the host still holds the pruned id");
}

#[test]
fn test_prune_that_removes_nothing_needs_no_save() {
    let mut store = store();
    let pruned = store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Theme, ["A", "B", "C"]));
    assert!(pruned.is_empty());
    assert!(!store.needs_save());
}

#[test]
fn test_needs_save_cleared_by_save() {
    let mut store = store();
    store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Theme, ["A"]));
    assert!(store.needs_save());

    store.mark_saved(store.get().unwrap()).unwrap();
    assert!(!store.needs_save());
}

#[test]
fn test_icon_pack_prune() {
    let mut store = store();
    store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::IconPack, ["papirus"]));
    assert_eq!(store.get().unwrap().active_icon_packs, vec!["papirus"]);
}

#[test]
fn test_wallpaper_prune_drops_resources() {
    let mut store = store();
    store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Wallpaper, ["w2", "w3"]));

    let doc = store.get().unwrap();
    assert_eq!(doc.collection("C").unwrap().resources, vec!["w2"]);
    assert_eq!(doc.collection("D").unwrap().resources, vec!["w3"]);
}

#[test]
fn test_restore_cannot_resurrect_pruned_ids() {
    let mut store = store();
    store.patch("", json!({"language": "it"})).unwrap();
    store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Theme, ["A"]));
    store.restore_to_last_loaded().unwrap();

    assert_eq!(store.get().unwrap().active_themes, vec!["A"]);
    assert_eq!(store.get().unwrap().language, "en");
}

#[test]
fn test_patch_adding_unknown_theme_rejected_once_catalog_known() {
    let mut store = store();
    store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Theme, ["A", "B", "C"]));

    let err = store
        .patch("", json!({"activeThemes": ["A", "ghost"]}))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    store.patch("", json!({"activeThemes": ["C", "A"]})).unwrap();
}

// =============================================================================
// Repair on load
// =============================================================================

#[test]
fn test_load_repairs_with_known_catalog() {
    let mut store = ConfigStore::new();
    store.apply_catalog(&CatalogFeed::from_ids(ResourceKind::Theme, ["A"]));

    let mut doc = document();
    doc.collections.retain(|c| c.id != "D");
    let repaired = store.load_document(doc);

    assert!(repaired.contains(&Reference::Theme("B".to_string())));
    assert!(repaired.contains(&Reference::MonitorCollection {
        monitor_id: "M2".to_string(),
        collection_id: "D".to_string(),
    }));

    let loaded = store.get().unwrap();
    assert_eq!(loaded.active_themes, vec!["A"]);
    assert_eq!(loaded.monitors["M2"].wallpaper_collection, None);
    assert!(!store.is_dirty());
    assert!(store.needs_save());
}
