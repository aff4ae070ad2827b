//! Addressing subtrees of the settings document.
//!
//! Paths are dot-separated object keys, e.g. `byWidget.toolbar` or
//! `updater`. The empty path addresses the document root. Arrays are not
//! addressable.

use std::fmt;

use serde_json::Value;

pub use shellconf_protocol::document::{ENABLED_KEY, INSTANCES_KEY};
pub use shellconf_protocol::{
    Collection, MonitorConfig, SettingsBlob, SettingsDocument, WidgetConfig, WorkspaceConfig,
};

/// Path to an object subtree of the document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DocumentPath {
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid document path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: &'static str,
}

impl DocumentPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dot-separated path. Empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError {
                path: path.to_string(),
                reason: "empty segment",
            });
        }
        Ok(Self { segments })
    }

    /// Build a path from raw keys, for ids that contain dots
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn resolve<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(value, |current, key| current.as_object()?.get(key))
    }

    pub fn resolve_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Value> {
        self.segments
            .iter()
            .try_fold(value, |current, key| current.as_object_mut()?.get_mut(key))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "<root>");
        }
        write!(f, "{}", self.segments.join("."))
    }
}

/// Short name of a JSON value's type, for error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
