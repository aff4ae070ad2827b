//! Referential integrity of resource references.
//!
//! Nothing in a committed document may point at a resource that does not
//! exist: collection references must name a collection in the document, and
//! theme, icon pack and wallpaper ids must be present in the last catalog the
//! host published for their kind. Every function here edits a working copy
//! that the store commits as one mutation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use shellconf_protocol::{ResourceKind, SettingsDocument};

/// Resource ids the host reported per kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownCatalog {
    by_kind: BTreeMap<ResourceKind, BTreeSet<String>>,
}

impl KnownCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: ResourceKind, ids: BTreeSet<String>) {
        self.by_kind.insert(kind, ids);
    }

    pub fn ids(&self, kind: ResourceKind) -> Option<&BTreeSet<String>> {
        self.by_kind.get(&kind)
    }

    /// Kinds the host has published so far
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.by_kind.keys().copied()
    }

    /// An id is acceptable when its kind has no catalog yet or the catalog lists it
    pub fn admits(&self, kind: ResourceKind, id: &str) -> bool {
        self.by_kind.get(&kind).map_or(true, |ids| ids.contains(id))
    }
}

/// A single reference held by the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    GlobalCollection(String),
    MonitorCollection {
        monitor_id: String,
        collection_id: String,
    },
    WorkspaceCollection {
        monitor_id: String,
        workspace_id: String,
        collection_id: String,
    },
    Theme(String),
    IconPack(String),
    Wallpaper {
        collection_id: String,
        resource_id: String,
    },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalCollection(id) => write!(f, "wallpaperCollection -> {}", id),
            Self::MonitorCollection {
                monitor_id,
                collection_id,
            } => write!(f, "monitors.{}.wallpaperCollection -> {}", monitor_id, collection_id),
            Self::WorkspaceCollection {
                monitor_id,
                workspace_id,
                collection_id,
            } => write!(
                f,
                "monitors.{}.byWorkspace.{}.wallpaperCollection -> {}",
                monitor_id, workspace_id, collection_id
            ),
            Self::Theme(id) => write!(f, "activeThemes -> {}", id),
            Self::IconPack(id) => write!(f, "activeIconPacks -> {}", id),
            Self::Wallpaper {
                collection_id,
                resource_id,
            } => write!(f, "collections.{} -> {}", collection_id, resource_id),
        }
    }
}

/// Remove collection `collection_id` and null every reference to it.
///
/// Returns `None` when no such collection exists; the document is untouched.
pub fn delete_collection(
    document: &mut SettingsDocument,
    collection_id: &str,
) -> Option<Vec<Reference>> {
    let index = document
        .collections
        .iter()
        .position(|c| c.id == collection_id)?;
    document.collections.remove(index);
    Some(detach_collection(document, collection_id))
}

/// Null every reference to `collection_id`: global default, monitors and
/// workspace overrides.
pub fn detach_collection(document: &mut SettingsDocument, collection_id: &str) -> Vec<Reference> {
    detach_collections_where(document, |id| id == collection_id)
}

fn detach_collections_where<F>(document: &mut SettingsDocument, is_gone: F) -> Vec<Reference>
where
    F: Fn(&str) -> bool,
{
    let mut detached = Vec::new();

    if let Some(id) = document.wallpaper_collection.take_if_gone(&is_gone) {
        detached.push(Reference::GlobalCollection(id));
    }

    for (monitor_id, monitor) in document.monitors.iter_mut() {
        if let Some(id) = monitor.wallpaper_collection.take_if_gone(&is_gone) {
            detached.push(Reference::MonitorCollection {
                monitor_id: monitor_id.clone(),
                collection_id: id,
            });
        }

        for (workspace_id, workspace) in monitor.by_workspace.iter_mut() {
            if let Some(id) = workspace.wallpaper_collection.take_if_gone(&is_gone) {
                detached.push(Reference::WorkspaceCollection {
                    monitor_id: monitor_id.clone(),
                    workspace_id: workspace_id.clone(),
                    collection_id: id,
                });
            }
        }
    }

    detached
}

trait TakeIfGone {
    fn take_if_gone<F: Fn(&str) -> bool>(&mut self, is_gone: &F) -> Option<String>;
}

impl TakeIfGone for Option<String> {
    fn take_if_gone<F: Fn(&str) -> bool>(&mut self, is_gone: &F) -> Option<String> {
        if self.as_deref().is_some_and(is_gone) {
            self.take()
        } else {
            None
        }
    }
}

/// Collection ids present in `before` but not in `after`
pub fn removed_collections(before: &SettingsDocument, after: &SettingsDocument) -> Vec<String> {
    before
        .collections
        .iter()
        .filter(|c| !after.has_collection(&c.id))
        .map(|c| c.id.clone())
        .collect()
}

/// Drop ids not in `ids` from the document's references of `kind`,
/// preserving the order of survivors.
pub fn prune_to_catalog(
    document: &mut SettingsDocument,
    kind: ResourceKind,
    ids: &BTreeSet<String>,
) -> Vec<Reference> {
    let mut removed = Vec::new();

    match kind {
        ResourceKind::Theme => {
            document.active_themes.retain(|id| {
                let keep = ids.contains(id);
                if !keep {
                    removed.push(Reference::Theme(id.clone()));
                }
                keep
            });
        }
        ResourceKind::IconPack => {
            document.active_icon_packs.retain(|id| {
                let keep = ids.contains(id);
                if !keep {
                    removed.push(Reference::IconPack(id.clone()));
                }
                keep
            });
        }
        ResourceKind::Wallpaper => {
            for collection in document.collections.iter_mut() {
                let collection_id = &collection.id;
                collection.resources.retain(|id| {
                    let keep = ids.contains(id);
                    if !keep {
                        removed.push(Reference::Wallpaper {
                            collection_id: collection_id.clone(),
                            resource_id: id.clone(),
                        });
                    }
                    keep
                });
            }
        }
        // Widget configs outlive a temporarily missing widget.
        ResourceKind::Widget => {}
    }

    removed
}

/// Every reference in `document` that points at nothing.
pub fn dangling_references(document: &SettingsDocument, catalog: &KnownCatalog) -> Vec<Reference> {
    let mut dangling = Vec::new();
    let missing = |id: &str| !document.has_collection(id);

    if let Some(id) = document.wallpaper_collection.as_deref().filter(|id| missing(*id)) {
        dangling.push(Reference::GlobalCollection(id.to_string()));
    }

    for (monitor_id, monitor) in &document.monitors {
        if let Some(id) = monitor.wallpaper_collection.as_deref().filter(|id| missing(*id)) {
            dangling.push(Reference::MonitorCollection {
                monitor_id: monitor_id.clone(),
                collection_id: id.to_string(),
            });
        }
        for (workspace_id, workspace) in &monitor.by_workspace {
            if let Some(id) = workspace.wallpaper_collection.as_deref().filter(|id| missing(*id)) {
                dangling.push(Reference::WorkspaceCollection {
                    monitor_id: monitor_id.clone(),
                    workspace_id: workspace_id.clone(),
                    collection_id: id.to_string(),
                });
            }
        }
    }

    for id in &document.active_themes {
        if !catalog.admits(ResourceKind::Theme, id) {
            dangling.push(Reference::Theme(id.clone()));
        }
    }
    for id in &document.active_icon_packs {
        if !catalog.admits(ResourceKind::IconPack, id) {
            dangling.push(Reference::IconPack(id.clone()));
        }
    }
    for collection in &document.collections {
        for id in &collection.resources {
            if !catalog.admits(ResourceKind::Wallpaper, id) {
                dangling.push(Reference::Wallpaper {
                    collection_id: collection.id.clone(),
                    resource_id: id.clone(),
                });
            }
        }
    }

    dangling
}

/// Remove every dangling reference, returning what was removed.
pub fn repair(document: &mut SettingsDocument, catalog: &KnownCatalog) -> Vec<Reference> {
    let existing: BTreeSet<String> = document.collections.iter().map(|c| c.id.clone()).collect();
    let mut removed = detach_collections_where(document, |id| !existing.contains(id));

    for kind in catalog.kinds().collect::<Vec<_>>() {
        if let Some(ids) = catalog.ids(kind) {
            removed.extend(prune_to_catalog(document, kind, ids));
        }
    }

    removed
}
