//! Resource catalog feeds.
//!
//! The host publishes what themes, icon packs, wallpapers and widgets
//! currently exist. The core only ever looks at the ids.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Kind of externally supplied resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Theme,
    IconPack,
    Wallpaper,
    Widget,
}

/// One resource known to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    /// Display metadata, uninterpreted
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Full listing of one resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFeed {
    pub kind: ResourceKind,
    pub entries: Vec<CatalogEntry>,
}

impl CatalogFeed {
    /// Build a feed from bare ids
    pub fn from_ids<I, S>(kind: ResourceKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            entries: ids.into_iter().map(CatalogEntry::new).collect(),
        }
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}
