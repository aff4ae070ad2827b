//! Persisted settings document.
//!
//! One versioned value holds the configuration of every widget, monitor and
//! wallpaper collection. Widget settings are opaque blobs: only the reserved
//! `enabled` and `instances` keys are interpreted here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Free-form settings owned by a widget.
pub type SettingsBlob = Map<String, Value>;

/// Reserved key toggling a widget on or off.
pub const ENABLED_KEY: &str = "enabled";

/// Reserved key holding per-instance overrides.
pub const INSTANCES_KEY: &str = "instances";

/// Root settings document as persisted by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    /// Widget id to widget configuration
    #[serde(default)]
    pub by_widget: BTreeMap<String, WidgetConfig>,

    /// Monitor id to monitor-scoped overrides
    #[serde(default)]
    pub monitors: BTreeMap<String, MonitorConfig>,

    /// Wallpaper collections in display order
    #[serde(default)]
    pub collections: Vec<Collection>,

    /// Global default wallpaper collection
    #[serde(default)]
    pub wallpaper_collection: Option<String>,

    /// Active themes, highest priority last
    #[serde(default)]
    pub active_themes: Vec<String>,

    /// Active icon packs, highest priority last
    #[serde(default)]
    pub active_icon_packs: Vec<String>,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Action name to key chord
    #[serde(default)]
    pub shortcuts: SettingsBlob,

    #[serde(default)]
    pub performance_mode: PerformanceMode,

    #[serde(default)]
    pub virtual_desktop_strategy: VirtualDesktopStrategy,

    #[serde(default = "default_true")]
    pub hardware_acceleration: bool,

    #[serde(default)]
    pub updater: UpdaterConfig,

    /// Keys this version does not interpret, carried through unchanged
    #[serde(flatten)]
    pub extra: SettingsBlob,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_date_format() -> String {
    "ddd D MMM, hh:mm A".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            by_widget: BTreeMap::new(),
            monitors: BTreeMap::new(),
            collections: Vec::new(),
            wallpaper_collection: None,
            active_themes: Vec::new(),
            active_icon_packs: Vec::new(),
            language: default_language(),
            date_format: default_date_format(),
            shortcuts: SettingsBlob::new(),
            performance_mode: PerformanceMode::default(),
            virtual_desktop_strategy: VirtualDesktopStrategy::default(),
            hardware_acceleration: true,
            updater: UpdaterConfig::default(),
            extra: SettingsBlob::new(),
        }
    }
}

impl SettingsDocument {
    /// Look up a collection by id
    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    /// Check whether a collection with this id exists
    pub fn has_collection(&self, id: &str) -> bool {
        self.collection(id).is_some()
    }

    /// Bring the document into canonical shape.
    ///
    /// Empty `instances` containers are removed rather than retained.
    pub fn normalize(&mut self) {
        for widget in self.by_widget.values_mut() {
            if widget.instances.as_ref().is_some_and(|i| i.is_empty()) {
                widget.instances = None;
            }
        }
    }

    /// SHA-256 hex digest of the RFC 8785 canonical form of this document.
    pub fn digest(&self) -> Result<String, DigestError> {
        let bytes = serde_json_canonicalizer::to_vec(self)
            .map_err(|e| DigestError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Canonicalization failure while computing a document digest
#[derive(Debug, thiserror::Error)]
#[error("JCS canonicalization error: {0}")]
pub struct DigestError(pub String);

/// Configuration of one widget.
///
/// Everything except `enabled` and `instances` lands in `settings` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Absent means enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Instance id to partial override, for multi-instance widgets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<BTreeMap<String, SettingsBlob>>,

    #[serde(flatten)]
    pub settings: SettingsBlob,
}

impl WidgetConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn instance(&self, instance_id: &str) -> Option<&SettingsBlob> {
        self.instances.as_ref()?.get(instance_id)
    }

    pub fn has_instance(&self, instance_id: &str) -> bool {
        self.instance(instance_id).is_some()
    }

    /// Instance ids in stable order
    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().flat_map(|m| m.keys().map(String::as_str))
    }
}

/// Per-monitor overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Widget id to partial override applied on this monitor
    #[serde(default)]
    pub by_widget: BTreeMap<String, SettingsBlob>,

    /// Workspace id to workspace-scoped overrides
    #[serde(default, alias = "workspaces")]
    pub by_workspace: BTreeMap<String, WorkspaceConfig>,

    #[serde(default)]
    pub wallpaper_collection: Option<String>,

    #[serde(flatten)]
    pub extra: SettingsBlob,
}

/// Per-workspace overrides on a monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub wallpaper_collection: Option<String>,

    #[serde(flatten)]
    pub extra: SettingsBlob,
}

/// Named, ordered list of wallpaper resource ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(flatten)]
    pub extra: SettingsBlob,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    #[default]
    Disabled,
    Minimal,
    Extreme,
}

/// How virtual desktops are provided; switching requires a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualDesktopStrategy {
    #[default]
    Native,
    Emulated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateChannel {
    #[default]
    Release,
    Beta,
    Nightly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdaterConfig {
    #[serde(default)]
    pub channel: UpdateChannel,

    #[serde(flatten)]
    pub extra: SettingsBlob,
}
