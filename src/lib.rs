//! Shellconf - configuration core for a modular desktop shell
//!
//! Holds the settings document in memory, keeps it in sync with the host
//! process that persists it, resolves layered per-widget and wallpaper
//! configuration, and keeps cross-references inside the document valid.

pub mod config;
pub mod document;
pub mod host;
pub mod integrity;
pub mod store;
pub mod sync;

pub use config::{CoreConfig, EffectiveConfig, WallpaperSource};
pub use document::DocumentPath;
pub use host::{FileHost, HostTransport, MockHost, TransportError};
pub use integrity::{KnownCatalog, Reference};
pub use store::{ConfigStore, StoreError, WallpaperTarget};
pub use sync::{SyncBridge, SyncConfig, SyncError, SyncOutcome, SyncStatus};

pub use shellconf_protocol::{
    CatalogFeed, Collection, HostError, HostMessage, MonitorConfig, ResourceKind, SettingsBlob,
    SettingsDocument, WidgetConfig, WorkspaceConfig,
};
