//! Shell configuration protocol types
//!
//! Defines the persisted settings document and the JSON envelope spoken
//! between the configuration core and the host process that owns it.

pub mod catalog;
pub mod document;
pub mod error;
pub mod message;
pub mod request;

pub use catalog::{CatalogEntry, CatalogFeed, ResourceKind};
pub use document::{
    Collection, DigestError, MonitorConfig, PerformanceMode, SettingsBlob, SettingsDocument,
    UpdateChannel, UpdaterConfig, VirtualDesktopStrategy, WidgetConfig, WorkspaceConfig,
};
pub use error::{HostError, HostErrorCode};
pub use message::{HostMessage, HostResponse};
pub use request::HostRequest;

/// Minimum protocol version supported by this implementation.
pub const PROTOCOL_MIN: i32 = 1;

/// Maximum protocol version supported by this implementation.
pub const PROTOCOL_MAX: i32 = 1;

/// Known operation names.
pub mod ops {
    pub const LOAD: &str = "load";
    pub const PERSIST: &str = "persist";
}
