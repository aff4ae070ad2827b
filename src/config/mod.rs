//! Configuration resolution
//!
//! Implements the override cascade for widgets (root → instance → monitor),
//! the pick-first wallpaper collection lookup, and the core's own TOML
//! configuration.

mod core_config;
mod effective;
mod merge;
mod wallpaper;

pub use core_config::{CoreConfig, CoreConfigError};
pub use effective::{resolve_all_instances, ConfigContext, EffectiveConfig};
pub use merge::{merge_in_order, shallow_merge, shallow_merge_owned};
pub use wallpaper::{resolve_wallpaper_collection, resolve_with_source, WallpaperSource};
