//! Core runtime configuration (~/.config/shellconf/core.toml)
//!
//! Tunes how the core talks to its host. Every field has a default, so a
//! missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound accepted for any timeout, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Document location used by the file-backed host (None = host default)
    pub settings_path: Option<PathBuf>,

    /// Seconds after which an unanswered echo guard is considered stale
    /// (0 disables the timeout)
    pub echo_timeout_seconds: u64,

    /// Seconds a blocking save waits for the host to settle the request
    pub persist_timeout_seconds: u64,

    /// Patch paths that require a restart, on top of the built-in list
    pub restart_required_paths: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            settings_path: None,
            echo_timeout_seconds: 30,
            persist_timeout_seconds: 10,
            restart_required_paths: Vec::new(),
        }
    }
}

/// Core configuration errors
#[derive(Debug, thiserror::Error)]
pub enum CoreConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreConfig {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf, CoreConfigError> {
        let home = std::env::var("HOME").map_err(|_| {
            CoreConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME environment variable not set",
            ))
        })?;
        Ok(PathBuf::from(home).join(".config/shellconf/core.toml"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_default() -> Result<Self, CoreConfigError> {
        let path = Self::default_path()?;
        Self::load_or_default(&path)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, CoreConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, CoreConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse from TOML string
    pub fn parse(content: &str) -> Result<Self, CoreConfigError> {
        let config: CoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreConfigError> {
        if let Some(path) = &self.settings_path {
            if !path.is_absolute() {
                return Err(CoreConfigError::Validation(format!(
                    "settings_path must be absolute, got '{}'",
                    path.display()
                )));
            }
        }

        if self.echo_timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(CoreConfigError::Validation(format!(
                "echo_timeout_seconds must be in [0, {}]",
                MAX_TIMEOUT_SECONDS
            )));
        }

        if self.persist_timeout_seconds == 0 || self.persist_timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(CoreConfigError::Validation(format!(
                "persist_timeout_seconds must be in (0, {}]",
                MAX_TIMEOUT_SECONDS
            )));
        }

        if let Some(bad) = self.restart_required_paths.iter().find(|p| p.trim().is_empty()) {
            return Err(CoreConfigError::Validation(format!(
                "restart_required_paths contains an empty path: {:?}",
                bad
            )));
        }

        Ok(())
    }

    pub fn echo_timeout(&self) -> Option<Duration> {
        match self.echo_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout_seconds)
    }
}
