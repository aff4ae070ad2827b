//! Settings that only take effect after a restart.

use serde_json::Value;

use crate::document::{DocumentPath, PathError};

/// Built-in restart-required paths
pub const RESTART_REQUIRED_PATHS: &[&str] = &[
    "virtualDesktopStrategy",
    "hardwareAcceleration",
    "updater.channel",
];

/// Allow-list of paths whose change raises the restart-required flag
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    paths: Vec<DocumentPath>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            paths: RESTART_REQUIRED_PATHS
                .iter()
                .filter_map(|p| DocumentPath::parse(p).ok())
                .collect(),
        }
    }
}

impl RestartPolicy {
    /// Built-in list extended with `extra` paths
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self, PathError> {
        let mut policy = Self::default();
        for path in extra {
            let parsed = DocumentPath::parse(path.as_ref())?;
            if !policy.paths.contains(&parsed) {
                policy.paths.push(parsed);
            }
        }
        Ok(policy)
    }

    /// First allow-listed path whose value differs between the two documents
    pub fn changed_path<'p>(&'p self, before: &Value, after: &Value) -> Option<&'p DocumentPath> {
        self.paths
            .iter()
            .find(|path| path.resolve(before) != path.resolve(after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changed_channel_detected() {
        let policy = RestartPolicy::default();
        let before = json!({"updater": {"channel": "release"}, "language": "en"});
        let after = json!({"updater": {"channel": "beta"}, "language": "en"});
        assert_eq!(
            policy.changed_path(&before, &after).map(|p| p.to_string()),
            Some("updater.channel".to_string())
        );
    }

    #[test]
    fn test_unrelated_change_ignored() {
        let policy = RestartPolicy::default();
        let before = json!({"language": "en", "hardwareAcceleration": true});
        let after = json!({"language": "de", "hardwareAcceleration": true});
        assert!(policy.changed_path(&before, &after).is_none());
    }

    #[test]
    fn test_extra_paths() {
        let policy = RestartPolicy::with_extra(&["byWidget.wm.enabled"]).unwrap();
        let before = json!({"byWidget": {"wm": {"enabled": true}}});
        let after = json!({"byWidget": {"wm": {"enabled": false}}});
        assert!(policy.changed_path(&before, &after).is_some());

        assert!(RestartPolicy::with_extra(&["byWidget..x"]).is_err());
    }
}
