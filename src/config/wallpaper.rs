//! Active wallpaper collection lookup.
//!
//! Unlike widget settings this is a single reference, so the cascade picks the
//! first level that defines one instead of merging:
//! workspace → monitor → global default → none.

use shellconf_protocol::SettingsDocument;

/// Level that supplied the active collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallpaperSource {
    Workspace,
    Monitor,
    Global,
}

/// Resolve the active wallpaper collection id for a monitor and workspace.
pub fn resolve_wallpaper_collection<'d>(
    document: &'d SettingsDocument,
    monitor_id: &str,
    workspace_id: Option<&str>,
) -> Option<&'d str> {
    resolve_with_source(document, monitor_id, workspace_id).map(|(id, _)| id)
}

/// Same as [`resolve_wallpaper_collection`], also reporting the winning level.
pub fn resolve_with_source<'d>(
    document: &'d SettingsDocument,
    monitor_id: &str,
    workspace_id: Option<&str>,
) -> Option<(&'d str, WallpaperSource)> {
    let monitor = document.monitors.get(monitor_id);

    let workspace = workspace_id
        .and_then(|ws| monitor?.by_workspace.get(ws))
        .and_then(|ws| ws.wallpaper_collection.as_deref())
        .map(|id| (id, WallpaperSource::Workspace));

    workspace
        .or_else(|| {
            monitor
                .and_then(|m| m.wallpaper_collection.as_deref())
                .map(|id| (id, WallpaperSource::Monitor))
        })
        .or_else(|| {
            document
                .wallpaper_collection
                .as_deref()
                .map(|id| (id, WallpaperSource::Global))
        })
}
