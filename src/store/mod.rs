//! In-memory configuration store.
//!
//! Owns the live settings document. Every mutation builds a new document from
//! the current snapshot and commits it in one step, so readers holding an
//! `Arc` from [`ConfigStore::get`] never observe a half-applied change.
//!
//! Store states: UNLOADED → READY. Until the host has supplied a document,
//! reads and mutations fail with [`StoreError::Unloaded`].

mod ids;
mod restart;
mod session;

pub use ids::{fresh_id, IdSource, UlidSource, MAX_ID_ATTEMPTS};
pub use restart::{RestartPolicy, RESTART_REQUIRED_PATHS};
pub use session::SessionState;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use shellconf_protocol::{CatalogFeed, Collection, SettingsBlob, SettingsDocument};
use tracing::{debug, info, warn};

use crate::config::{
    resolve_all_instances, resolve_wallpaper_collection, shallow_merge_owned, ConfigContext,
    CoreConfig, EffectiveConfig,
};
use crate::document::{value_kind, DocumentPath};
use crate::integrity::{self, KnownCatalog, Reference};

/// Where a wallpaper collection assignment applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WallpaperTarget {
    Global,
    Monitor(String),
    Workspace {
        monitor_id: String,
        workspace_id: String,
    },
}

/// Errors for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("settings have not been loaded yet")]
    Unloaded,

    #[error("unknown instance '{instance_id}' of widget '{widget_id}'")]
    UnknownInstance {
        widget_id: String,
        instance_id: String,
    },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("could not generate a unique id for '{scope}' after {attempts} attempts")]
    ResourceExhausted { scope: String, attempts: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

struct Loaded {
    current: Arc<SettingsDocument>,
    last_loaded: Arc<SettingsDocument>,
    revision: u64,
    /// References were dropped from both documents that the host still holds
    repaired_since_save: bool,
}

/// Single in-memory source of truth for the settings document
pub struct ConfigStore {
    loaded: Option<Loaded>,
    session: SessionState,
    restart_required: bool,
    restart_policy: RestartPolicy,
    catalog: KnownCatalog,
    ids: Box<dyn IdSource>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Create an unloaded store with the built-in restart policy
    pub fn new() -> Self {
        Self {
            loaded: None,
            session: SessionState::default(),
            restart_required: false,
            restart_policy: RestartPolicy::default(),
            catalog: KnownCatalog::new(),
            ids: Box::new(UlidSource),
        }
    }

    /// Create an unloaded store honoring the core configuration
    pub fn from_config(config: &CoreConfig) -> Result<Self, StoreError> {
        let policy = RestartPolicy::with_extra(&config.restart_required_paths)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        Ok(Self::new().with_restart_policy(policy))
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_id_source(mut self, source: Box<dyn IdSource>) -> Self {
        self.ids = source;
        self
    }

    // === Lifecycle ===

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Install the document fetched at startup as state and snapshot
    pub fn load_document(&mut self, document: SettingsDocument) -> Vec<Reference> {
        self.install(document, "load")
    }

    /// Replace the document wholesale after a genuine external change.
    ///
    /// Unsaved local edits are discarded.
    pub fn replace_from_host(&mut self, document: SettingsDocument) -> Vec<Reference> {
        if self.is_dirty() {
            warn!("external change replaces unsaved local edits");
        }
        self.install(document, "external")
    }

    fn install(&mut self, mut document: SettingsDocument, origin: &'static str) -> Vec<Reference> {
        document.normalize();
        let repaired = integrity::repair(&mut document, &self.catalog);
        for reference in &repaired {
            warn!(origin, reference = %reference, "dropped dangling reference");
        }

        let document = Arc::new(document);
        let revision = self.loaded.as_ref().map_or(0, |l| l.revision + 1);
        self.loaded = Some(Loaded {
            current: Arc::clone(&document),
            last_loaded: document,
            revision,
            repaired_since_save: !repaired.is_empty(),
        });
        info!(origin, revision, "settings document installed");
        repaired
    }

    /// Record that `saved` is now durable; it becomes the snapshot that
    /// dirtiness is measured against.
    pub fn mark_saved(&mut self, saved: Arc<SettingsDocument>) -> Result<(), StoreError> {
        let loaded = self.loaded.as_mut().ok_or(StoreError::Unloaded)?;
        loaded.last_loaded = saved;
        loaded.repaired_since_save = false;
        debug!(dirty = self.is_dirty(), "save confirmed");
        Ok(())
    }

    /// Discard edits made since the last load or save.
    ///
    /// Session-only state and the restart flag are left as they are.
    pub fn restore_to_last_loaded(&mut self) -> Result<(), StoreError> {
        let loaded = self.loaded.as_mut().ok_or(StoreError::Unloaded)?;
        if Arc::ptr_eq(&loaded.current, &loaded.last_loaded) || loaded.current == loaded.last_loaded {
            return Ok(());
        }
        loaded.current = Arc::clone(&loaded.last_loaded);
        loaded.revision += 1;
        info!(revision = loaded.revision, "restored last loaded settings");
        Ok(())
    }

    // === Reads ===

    /// Current document snapshot
    pub fn get(&self) -> Result<Arc<SettingsDocument>, StoreError> {
        self.loaded
            .as_ref()
            .map(|l| Arc::clone(&l.current))
            .ok_or(StoreError::Unloaded)
    }

    pub fn last_loaded(&self) -> Result<Arc<SettingsDocument>, StoreError> {
        self.loaded
            .as_ref()
            .map(|l| Arc::clone(&l.last_loaded))
            .ok_or(StoreError::Unloaded)
    }

    /// Bumped on every committed change, including wholesale replaces
    pub fn revision(&self) -> Option<u64> {
        self.loaded.as_ref().map(|l| l.revision)
    }

    /// True iff the current document differs from the last loaded or saved one
    pub fn is_dirty(&self) -> bool {
        self.loaded.as_ref().is_some_and(|l| {
            !Arc::ptr_eq(&l.current, &l.last_loaded) && l.current != l.last_loaded
        })
    }

    /// True iff the host's copy differs from the current document.
    ///
    /// Covers local edits and also references pruned or repaired away since
    /// the last save, which leave [`ConfigStore::is_dirty`] false.
    pub fn needs_save(&self) -> bool {
        self.is_dirty() || self.loaded.as_ref().is_some_and(|l| l.repaired_since_save)
    }

    /// Once raised, stays raised for the rest of the session
    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn resolve_effective_config(
        &self,
        widget_id: &str,
        instance_id: Option<&str>,
        monitor_id: Option<&str>,
    ) -> Result<EffectiveConfig, StoreError> {
        let document = self.get()?;
        Ok(EffectiveConfig::resolve(
            &document,
            ConfigContext {
                widget_id,
                instance_id,
                monitor_id,
            },
        ))
    }

    pub fn resolve_all_instances(
        &self,
        widget_id: &str,
        monitor_id: Option<&str>,
    ) -> Result<Vec<EffectiveConfig>, StoreError> {
        let document = self.get()?;
        Ok(resolve_all_instances(&document, widget_id, monitor_id))
    }

    pub fn resolve_wallpaper_collection(
        &self,
        monitor_id: &str,
        workspace_id: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let document = self.get()?;
        Ok(resolve_wallpaper_collection(&document, monitor_id, workspace_id).map(str::to_string))
    }

    // === Mutations ===

    /// Shallow-merge `partial` into the object at dot-separated `path`.
    pub fn patch(&mut self, path: &str, partial: Value) -> Result<(), StoreError> {
        let path = DocumentPath::parse(path).map_err(|e| StoreError::Validation(e.to_string()))?;
        self.patch_at(&path, partial)
    }

    /// Shallow-merge `partial` into the object at `path`.
    ///
    /// Collections dropped by the patch have their references nulled in the
    /// same commit. On any error the document is unchanged.
    pub fn patch_at(&mut self, path: &DocumentPath, partial: Value) -> Result<(), StoreError> {
        let current = self.get()?;

        let partial = match partial {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Validation(format!(
                    "patch value for '{}' must be an object, got {}",
                    path,
                    value_kind(&other)
                )))
            }
        };

        let before = serde_json::to_value(&*current)?;
        let mut working = before.clone();
        let target = path.resolve_mut(&mut working).ok_or_else(|| {
            StoreError::Validation(format!("path '{}' does not resolve to an existing subtree", path))
        })?;
        match target {
            Value::Object(map) => shallow_merge_owned(map, partial),
            other => {
                return Err(StoreError::Validation(format!(
                    "path '{}' addresses a {}, not an object",
                    path,
                    value_kind(other)
                )))
            }
        }

        let mut next: SettingsDocument = serde_json::from_value(working).map_err(|e| {
            StoreError::Validation(format!("patch at '{}' does not fit the document: {}", path, e))
        })?;

        for collection_id in integrity::removed_collections(&current, &next) {
            let detached = integrity::detach_collection(&mut next, &collection_id);
            info!(collection = %collection_id, detached = detached.len(), "patch removed collection");
        }
        next.normalize();

        let after = serde_json::to_value(&next)?;
        let restart_path = self.restart_policy.changed_path(&before, &after).cloned();

        self.commit("patch", next)?;

        if let Some(changed) = restart_path {
            self.raise_restart_required(&changed);
        }
        Ok(())
    }

    /// Add an empty instance override to a multi-instance widget.
    ///
    /// A widget without an entry is an empty root; one is created for it.
    pub fn create_instance(&mut self, widget_id: &str) -> Result<String, StoreError> {
        let current = self.get()?;
        let existing = current.by_widget.get(widget_id);

        let instance_id = fresh_id(self.ids.as_mut(), |id| {
            !existing.is_some_and(|widget| widget.has_instance(id))
        })
        .ok_or_else(|| StoreError::ResourceExhausted {
            scope: widget_id.to_string(),
            attempts: MAX_ID_ATTEMPTS,
        })?;

        let mut next = (*current).clone();
        next.by_widget
            .entry(widget_id.to_string())
            .or_default()
            .instances
            .get_or_insert_with(BTreeMap::new)
            .insert(instance_id.clone(), SettingsBlob::new());
        self.commit("create_instance", next)?;

        debug!(widget = widget_id, instance = %instance_id, "instance created");
        Ok(instance_id)
    }

    /// Remove an instance; the container goes away with its last instance
    pub fn delete_instance(&mut self, widget_id: &str, instance_id: &str) -> Result<(), StoreError> {
        let current = self.get()?;
        let mut next = (*current).clone();

        let removed = next
            .by_widget
            .get_mut(widget_id)
            .and_then(|widget| widget.instances.as_mut())
            .and_then(|instances| instances.remove(instance_id));
        if removed.is_none() {
            return Err(StoreError::UnknownInstance {
                widget_id: widget_id.to_string(),
                instance_id: instance_id.to_string(),
            });
        }

        self.commit("delete_instance", next)?;
        debug!(widget = widget_id, instance = instance_id, "instance deleted");
        Ok(())
    }

    /// Append a new wallpaper collection, returning its id
    pub fn create_collection(
        &mut self,
        name: &str,
        resources: Vec<String>,
    ) -> Result<String, StoreError> {
        let current = self.get()?;
        let id = fresh_id(self.ids.as_mut(), |id| !current.has_collection(id)).ok_or_else(|| {
            StoreError::ResourceExhausted {
                scope: "collections".to_string(),
                attempts: MAX_ID_ATTEMPTS,
            }
        })?;

        let mut next = (*current).clone();
        next.collections.push(Collection {
            id: id.clone(),
            name: name.to_string(),
            resources,
            extra: Default::default(),
        });
        self.commit("create_collection", next)?;
        Ok(id)
    }

    pub fn set_collection_resources(
        &mut self,
        collection_id: &str,
        resources: Vec<String>,
    ) -> Result<(), StoreError> {
        let current = self.get()?;
        let mut next = (*current).clone();
        let collection = next
            .collections
            .iter_mut()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| StoreError::UnknownCollection(collection_id.to_string()))?;
        collection.resources = resources;
        self.commit("set_collection_resources", next)
    }

    /// Delete a collection and null every reference to it in one commit
    pub fn delete_collection(&mut self, collection_id: &str) -> Result<Vec<Reference>, StoreError> {
        let current = self.get()?;
        let mut next = (*current).clone();
        let detached = integrity::delete_collection(&mut next, collection_id)
            .ok_or_else(|| StoreError::UnknownCollection(collection_id.to_string()))?;

        self.commit("delete_collection", next)?;
        info!(collection = collection_id, detached = detached.len(), "collection deleted");
        Ok(detached)
    }

    /// Point a wallpaper slot at a collection, or clear it with `None`
    pub fn set_wallpaper_collection(
        &mut self,
        target: &WallpaperTarget,
        collection_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let current = self.get()?;
        if let Some(id) = collection_id {
            if !current.has_collection(id) {
                return Err(StoreError::UnknownCollection(id.to_string()));
            }
        }

        let mut next = (*current).clone();
        let value = collection_id.map(str::to_string);
        match target {
            WallpaperTarget::Global => next.wallpaper_collection = value,
            WallpaperTarget::Monitor(monitor_id) => {
                next.monitors
                    .entry(monitor_id.clone())
                    .or_default()
                    .wallpaper_collection = value;
            }
            WallpaperTarget::Workspace {
                monitor_id,
                workspace_id,
            } => {
                next.monitors
                    .entry(monitor_id.clone())
                    .or_default()
                    .by_workspace
                    .entry(workspace_id.clone())
                    .or_default()
                    .wallpaper_collection = value;
            }
        }
        self.commit("set_wallpaper_collection", next)
    }

    /// Remember a refreshed catalog and prune references it no longer lists.
    ///
    /// The last-loaded snapshot is pruned too, so neither dirtiness nor a
    /// later restore can resurrect a dropped id. The host keeps the dropped
    /// ids until the next save; see [`ConfigStore::needs_save`].
    pub fn apply_catalog(&mut self, feed: &CatalogFeed) -> Vec<Reference> {
        let ids = feed.ids();
        self.catalog.set(feed.kind, ids.clone());

        let Some(loaded) = self.loaded.as_mut() else {
            debug!(kind = ?feed.kind, "catalog remembered before load");
            return Vec::new();
        };

        let mut current = (*loaded.current).clone();
        let removed = integrity::prune_to_catalog(&mut current, feed.kind, &ids);

        let mut snapshot = (*loaded.last_loaded).clone();
        let removed_from_snapshot = integrity::prune_to_catalog(&mut snapshot, feed.kind, &ids);

        if !removed.is_empty() {
            loaded.current = Arc::new(current);
            loaded.revision += 1;
        }
        if !removed_from_snapshot.is_empty() {
            loaded.last_loaded = Arc::new(snapshot);
            loaded.repaired_since_save = true;
        }

        for reference in &removed {
            info!(kind = ?feed.kind, reference = %reference, "pruned reference missing from catalog");
        }
        removed
    }

    fn commit(&mut self, op: &'static str, mut next: SettingsDocument) -> Result<(), StoreError> {
        next.normalize();

        if let Some(dangling) = integrity::dangling_references(&next, &self.catalog).first() {
            return Err(StoreError::Validation(format!(
                "{} would leave a dangling reference: {}",
                op, dangling
            )));
        }

        let loaded = self.loaded.as_mut().ok_or(StoreError::Unloaded)?;
        if *loaded.current == next {
            debug!(op, "mutation produced no change");
            return Ok(());
        }

        loaded.current = Arc::new(next);
        loaded.revision += 1;
        let revision = loaded.revision;
        debug!(op, revision, dirty = self.is_dirty(), "committed");
        Ok(())
    }

    fn raise_restart_required(&mut self, path: &DocumentPath) {
        if !self.restart_required {
            info!(path = %path, "change requires a restart");
        }
        self.restart_required = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded_store(value: Value) -> ConfigStore {
        let mut store = ConfigStore::new();
        store.load_document(serde_json::from_value(value).unwrap());
        store
    }

    #[test]
    fn test_unloaded_rejects_everything() {
        let mut store = ConfigStore::new();
        assert!(matches!(store.get(), Err(StoreError::Unloaded)));
        assert!(matches!(store.patch("", json!({"language": "de"})), Err(StoreError::Unloaded)));
        assert!(matches!(
            store.resolve_effective_config("toolbar", None, None),
            Err(StoreError::Unloaded)
        ));
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_patch_root_field() {
        let mut store = loaded_store(json!({}));
        store.patch("", json!({"language": "de"})).unwrap();
        assert_eq!(store.get().unwrap().language, "de");
        assert!(store.is_dirty());
        assert_eq!(store.revision(), Some(1));
    }

    #[test]
    fn test_patch_missing_path_rejected() {
        let mut store = loaded_store(json!({}));
        let before = store.get().unwrap();
        let err = store.patch("byWidget.toolbar", json!({"height": 1})).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.get().unwrap(), before);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_patch_bad_shape_rejected() {
        let mut store = loaded_store(json!({"byWidget": {"toolbar": {}}}));
        assert!(store.patch("byWidget.toolbar", json!({"enabled": "yes"})).is_err());
        assert!(store.patch("", json!({"performanceMode": "turbo"})).is_err());
        assert!(store.patch("language", json!({"x": 1})).is_err());
        assert!(store.patch("", json!(["not", "an", "object"])).is_err());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_patch_is_shallow() {
        let mut store = loaded_store(json!({
            "byWidget": {"toolbar": {"margins": {"top": 1, "bottom": 2}, "height": 30}}
        }));
        store
            .patch("byWidget.toolbar", json!({"margins": {"top": 5}}))
            .unwrap();
        let doc = store.get().unwrap();
        assert_eq!(doc.by_widget["toolbar"].settings["margins"], json!({"top": 5}));
        assert_eq!(doc.by_widget["toolbar"].settings["height"], 30);
    }

    #[test]
    fn test_restart_flag_on_allow_listed_change() {
        let mut store = loaded_store(json!({}));
        store.patch("", json!({"language": "de"})).unwrap();
        assert!(!store.restart_required());

        store.patch("updater", json!({"channel": "beta"})).unwrap();
        assert!(store.restart_required());

        store.restore_to_last_loaded().unwrap();
        assert!(store.restart_required());
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let mut store = loaded_store(json!({}));
        let snapshot = store.get().unwrap();
        store.patch("", json!({"language": "ja"})).unwrap();
        assert_eq!(snapshot.language, "en");
        assert_eq!(store.get().unwrap().language, "ja");
    }

    #[test]
    fn test_patch_removing_collection_detaches_references() {
        let mut store = loaded_store(json!({
            "collections": [{"id": "c1", "name": "One"}],
            "wallpaperCollection": "c1",
            "monitors": {"m1": {"wallpaperCollection": "c1"}}
        }));
        store.patch("", json!({"collections": []})).unwrap();

        let doc = store.get().unwrap();
        assert!(doc.collections.is_empty());
        assert_eq!(doc.wallpaper_collection, None);
        assert_eq!(doc.monitors["m1"].wallpaper_collection, None);
    }

    #[test]
    fn test_patch_introducing_dangling_reference_rejected() {
        let mut store = loaded_store(json!({}));
        let err = store
            .patch("", json!({"wallpaperCollection": "nope"}))
            .unwrap_err();
        assert!(err.to_string().contains("dangling"));
    }

    #[test]
    fn test_set_wallpaper_collection_targets() {
        let mut store = loaded_store(json!({}));
        let id = store.create_collection("Space", vec![]).unwrap();

        store
            .set_wallpaper_collection(
                &WallpaperTarget::Workspace {
                    monitor_id: "m1".to_string(),
                    workspace_id: "w1".to_string(),
                },
                Some(&id),
            )
            .unwrap();
        assert_eq!(
            store.resolve_wallpaper_collection("m1", Some("w1")).unwrap(),
            Some(id.clone())
        );
        assert_eq!(store.resolve_wallpaper_collection("m1", None).unwrap(), None);

        assert!(matches!(
            store.set_wallpaper_collection(&WallpaperTarget::Global, Some("missing")),
            Err(StoreError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_load_repairs_dangling_references() {
        let mut store = ConfigStore::new();
        let repaired = store.load_document(
            serde_json::from_value(json!({"wallpaperCollection": "ghost"})).unwrap(),
        );
        assert_eq!(repaired, vec![Reference::GlobalCollection("ghost".to_string())]);
        assert_eq!(store.get().unwrap().wallpaper_collection, None);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_session_survives_restore() {
        let mut store = loaded_store(json!({}));
        store.session_mut().route = Some("/wallpapers".to_string());
        store.patch("", json!({"dateFormat": "YYYY"})).unwrap();
        store.restore_to_last_loaded().unwrap();
        assert_eq!(store.session().route.as_deref(), Some("/wallpapers"));
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_mark_saved_rebases_snapshot() {
        let mut store = loaded_store(json!({}));
        store.patch("", json!({"language": "it"})).unwrap();
        let saved = store.get().unwrap();
        store.patch("", json!({"language": "pt"})).unwrap();

        store.mark_saved(saved).unwrap();
        assert!(store.is_dirty());

        store.restore_to_last_loaded().unwrap();
        assert_eq!(store.get().unwrap().language, "it");
        assert!(!store.is_dirty());
    }

    struct Constant(&'static str);

    impl IdSource for Constant {
        fn next_id(&mut self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_id_exhaustion_is_resource_exhausted() {
        let mut store = loaded_store(json!({"byWidget": {"toolbar": {}}}))
            .with_id_source(Box::new(Constant("dup")));

        assert_eq!(store.create_instance("toolbar").unwrap(), "dup");
        let revision = store.revision();
        match store.create_instance("toolbar") {
            Err(StoreError::ResourceExhausted { scope, attempts }) => {
                assert_eq!(scope, "toolbar");
                assert_eq!(attempts, MAX_ID_ATTEMPTS);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.revision(), revision, "failed create must not commit");

        store.create_collection("First", Vec::new()).unwrap();
        assert!(matches!(
            store.create_collection("Second", Vec::new()),
            Err(StoreError::ResourceExhausted { .. })
        ));
        assert_eq!(store.get().unwrap().collections.len(), 1);
    }
}
