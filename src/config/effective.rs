//! Effective widget configuration
//!
//! Cascade, lowest to highest precedence:
//! 1. Widget root config (`enabled` defaults to true)
//! 2. Instance override (its `enabled` key is never read)
//! 3. Monitor override
//!
//! The result carries no record of which level supplied which key.

use serde::Serialize;
use serde_json::{Map, Value};
use shellconf_protocol::document::{ENABLED_KEY, INSTANCES_KEY};
use shellconf_protocol::{SettingsBlob, SettingsDocument, WidgetConfig};

use super::merge::merge_in_order;

/// Context a widget configuration is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigContext<'a> {
    pub widget_id: &'a str,
    pub instance_id: Option<&'a str>,
    pub monitor_id: Option<&'a str>,
}

impl<'a> ConfigContext<'a> {
    pub fn widget(widget_id: &'a str) -> Self {
        Self {
            widget_id,
            instance_id: None,
            monitor_id: None,
        }
    }

    pub fn with_instance(mut self, instance_id: &'a str) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    pub fn with_monitor(mut self, monitor_id: &'a str) -> Self {
        self.monitor_id = Some(monitor_id);
        self
    }
}

/// Flattened configuration of a widget in one context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub widget_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_id: Option<String>,

    /// The merged configuration object
    pub config: SettingsBlob,
}

impl EffectiveConfig {
    /// Resolve the configuration of a widget in `ctx`.
    ///
    /// A widget without an entry resolves to an empty, enabled root. Instance
    /// and monitor levels without an entry are skipped.
    pub fn resolve(document: &SettingsDocument, ctx: ConfigContext<'_>) -> Self {
        let widget = document.by_widget.get(ctx.widget_id);

        let root = root_level(widget);

        // Only the root decides whether the widget runs.
        let instance = ctx
            .instance_id
            .and_then(|id| widget.and_then(|w| w.instance(id)))
            .map(|overrides| {
                let mut level = overrides.clone();
                level.remove(ENABLED_KEY);
                level
            });

        let monitor = ctx.monitor_id.and_then(|id| {
            document
                .monitors
                .get(id)
                .and_then(|m| m.by_widget.get(ctx.widget_id))
        });

        let config = merge_in_order([Some(&root), instance.as_ref(), monitor]);

        Self {
            widget_id: ctx.widget_id.to_string(),
            instance_id: ctx.instance_id.map(str::to_string),
            monitor_id: ctx.monitor_id.map(str::to_string),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.get_bool(ENABLED_KEY).unwrap_or(true)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.config.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn root_level(widget: Option<&WidgetConfig>) -> Map<String, Value> {
    let mut root = widget.map(|w| w.settings.clone()).unwrap_or_default();
    // Flattened settings never hold the reserved keys, but stay explicit.
    root.remove(INSTANCES_KEY);
    root.insert(
        ENABLED_KEY.to_string(),
        Value::Bool(widget.map_or(true, WidgetConfig::is_enabled)),
    );
    root
}

/// Resolve the widget root and every instance of `widget_id`.
pub fn resolve_all_instances(
    document: &SettingsDocument,
    widget_id: &str,
    monitor_id: Option<&str>,
) -> Vec<EffectiveConfig> {
    let base = ConfigContext {
        widget_id,
        instance_id: None,
        monitor_id,
    };

    let mut resolved = vec![EffectiveConfig::resolve(document, base)];
    if let Some(widget) = document.by_widget.get(widget_id) {
        for instance_id in widget.instance_ids() {
            resolved.push(EffectiveConfig::resolve(
                document,
                ConfigContext {
                    instance_id: Some(instance_id),
                    ..base
                },
            ));
        }
    }
    resolved
}
