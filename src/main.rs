//! Shellconf CLI
//!
//! Entry point for the `shellconf` command-line tool. Every command loads the
//! settings document through a file-backed host; commands that change it save
//! before exiting.

use clap::{Parser, Subcommand};
use serde_json::Value;
use shellconf::config::{resolve_with_source, WallpaperSource};
use shellconf::{
    CatalogFeed, ConfigStore, CoreConfig, DocumentPath, FileHost, Reference, SyncBridge,
    SyncConfig, WallpaperTarget,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shellconf")]
#[command(about = "Inspect and edit desktop shell settings", version)]
struct Cli {
    /// Settings document (default: settings_path from core config, then
    /// ~/.config/shellconf/settings.json)
    #[arg(long, short = 'f', global = true)]
    file: Option<PathBuf>,

    /// Path to core config file (default: ~/.config/shellconf/core.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the document, or the subtree at a dot-separated path
    Show {
        /// Path such as "byWidget.clock" (default: whole document)
        path: Option<String>,
    },

    /// Print the effective configuration of a widget
    Resolve {
        widget: String,

        /// Instance whose overrides apply
        #[arg(long, short = 'i')]
        instance: Option<String>,

        /// Monitor whose overrides apply
        #[arg(long, short = 'm')]
        monitor: Option<String>,

        /// Resolve the widget root and every instance
        #[arg(long, conflicts_with = "instance")]
        all: bool,
    },

    /// Wallpaper collection assignment
    Wallpaper {
        #[command(subcommand)]
        action: WallpaperCommands,
    },

    /// Shallow-merge a JSON object into the object at a path
    Patch {
        /// Dot-separated path ("" for the document root)
        path: String,

        /// JSON object to merge
        value: String,
    },

    /// Widget instance management
    Instance {
        #[command(subcommand)]
        action: InstanceCommands,
    },

    /// Wallpaper collection management
    Collection {
        #[command(subcommand)]
        action: CollectionCommands,
    },

    /// Drop references to resources missing from a catalog file
    Prune {
        /// JSON catalog feed ({"kind": ..., "entries": [...]})
        catalog: PathBuf,
    },

    /// Report the document digest and dangling references
    Check {
        /// Catalog feeds to validate against
        #[arg(long)]
        catalog: Vec<PathBuf>,

        /// Save the repaired document
        #[arg(long)]
        fix: bool,
    },
}

#[derive(Subcommand)]
enum WallpaperCommands {
    /// Show the active collection for a monitor
    Resolve {
        monitor: String,

        #[arg(long, short = 'w')]
        workspace: Option<String>,
    },

    /// Assign a collection globally, to a monitor, or to a workspace
    Set {
        /// Collection id
        #[arg(required_unless_present = "clear")]
        collection: Option<String>,

        #[arg(long, short = 'm')]
        monitor: Option<String>,

        #[arg(long, short = 'w', requires = "monitor")]
        workspace: Option<String>,

        /// Remove the assignment instead
        #[arg(long, conflicts_with = "collection")]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// Add an instance to a widget and print its id
    Create { widget: String },

    /// Remove an instance from a widget
    Delete { widget: String, instance: String },
}

#[derive(Subcommand)]
enum CollectionCommands {
    /// Add a collection and print its id
    Create {
        name: String,

        /// Wallpaper resource ids
        resources: Vec<String>,
    },

    /// Delete a collection, clearing every reference to it
    Delete { id: String },
}

/// Loaded store plus the bridge it syncs through
struct Session {
    store: ConfigStore,
    bridge: SyncBridge,
    /// References dropped while loading (already logged by the store)
    repaired: Vec<Reference>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let core = load_core_config(cli.config.as_deref());
    let settings_path = match resolve_settings_path(cli.file.clone(), &core) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error locating settings: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Show { path } => run_show(&core, &settings_path, path.as_deref()),
        Commands::Resolve {
            widget,
            instance,
            monitor,
            all,
        } => run_resolve(&core, &settings_path, &widget, instance.as_deref(), monitor.as_deref(), all),
        Commands::Wallpaper { action } => match action {
            WallpaperCommands::Resolve { monitor, workspace } => {
                run_wallpaper_resolve(&core, &settings_path, &monitor, workspace.as_deref());
            }
            WallpaperCommands::Set {
                collection,
                monitor,
                workspace,
                clear,
            } => {
                let target = match (monitor, workspace) {
                    (Some(monitor_id), Some(workspace_id)) => WallpaperTarget::Workspace {
                        monitor_id,
                        workspace_id,
                    },
                    (Some(monitor_id), None) => WallpaperTarget::Monitor(monitor_id),
                    _ => WallpaperTarget::Global,
                };
                let collection = if clear { None } else { collection };
                run_mutation(&core, &settings_path, |store| {
                    store.set_wallpaper_collection(&target, collection.as_deref())?;
                    Ok(None)
                });
            }
        },
        Commands::Patch { path, value } => {
            let value: Value = match serde_json::from_str(&value) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Patch value is not valid JSON: {}", e);
                    process::exit(2);
                }
            };
            run_mutation(&core, &settings_path, |store| {
                store.patch(&path, value)?;
                if store.restart_required() {
                    Ok(Some("Restart required for this change to take effect".to_string()))
                } else {
                    Ok(None)
                }
            });
        }
        Commands::Instance { action } => match action {
            InstanceCommands::Create { widget } => {
                run_mutation(&core, &settings_path, |store| store.create_instance(&widget).map(Some));
            }
            InstanceCommands::Delete { widget, instance } => {
                run_mutation(&core, &settings_path, |store| {
                    store.delete_instance(&widget, &instance)?;
                    Ok(None)
                });
            }
        },
        Commands::Collection { action } => match action {
            CollectionCommands::Create { name, resources } => {
                run_mutation(&core, &settings_path, |store| {
                    store.create_collection(&name, resources).map(Some)
                });
            }
            CollectionCommands::Delete { id } => {
                run_mutation(&core, &settings_path, |store| {
                    let detached = store.delete_collection(&id)?;
                    Ok(Some(format!("Cleared {} reference(s)", detached.len())))
                });
            }
        },
        Commands::Prune { catalog } => run_prune(&core, &settings_path, &catalog),
        Commands::Check { catalog, fix } => run_check(&core, &settings_path, &catalog, fix),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_core_config(path: Option<&Path>) -> CoreConfig {
    let result = match path {
        Some(path) => CoreConfig::load(path),
        None => match CoreConfig::default_path() {
            Ok(path) => CoreConfig::load_or_default(&path),
            // No HOME: nothing to read, defaults apply
            Err(_) => Ok(CoreConfig::default()),
        },
    };

    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading core config: {}", e);
            process::exit(1);
        }
    }
}

fn resolve_settings_path(
    explicit: Option<PathBuf>,
    core: &CoreConfig,
) -> Result<PathBuf, shellconf::TransportError> {
    match explicit.or_else(|| core.settings_path.clone()) {
        Some(path) => Ok(path),
        None => FileHost::default_path(),
    }
}

fn open_session(core: &CoreConfig, settings_path: &Path, catalogs: &[CatalogFeed]) -> Session {
    let mut store = match ConfigStore::from_config(core) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error in core config: {}", e);
            process::exit(1);
        }
    };
    for feed in catalogs {
        store.apply_catalog(feed);
    }

    let host = Arc::new(FileHost::new(settings_path));
    let mut bridge = SyncBridge::with_config(host, SyncConfig::from(core));
    let repaired = match bridge.load(&mut store, None) {
        Ok(repaired) => repaired,
        Err(e) => {
            eprintln!("Error loading settings from {}: {}", settings_path.display(), e);
            process::exit(1);
        }
    };

    Session {
        store,
        bridge,
        repaired,
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn read_catalog(path: &Path) -> CatalogFeed {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
    match parsed {
        Ok(feed) => feed,
        Err(e) => {
            eprintln!("Error reading catalog {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_show(core: &CoreConfig, settings_path: &Path, path: Option<&str>) {
    let session = open_session(core, settings_path, &[]);
    let document = match session.store.get() {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let value = match serde_json::to_value(&*document) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error serializing document: {}", e);
            process::exit(1);
        }
    };

    let path = match DocumentPath::parse(path.unwrap_or("")) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    match path.resolve(&value) {
        Some(subtree) => print_json(subtree),
        None => {
            eprintln!("Nothing at '{}'", path);
            process::exit(1);
        }
    }
}

fn run_resolve(
    core: &CoreConfig,
    settings_path: &Path,
    widget: &str,
    instance: Option<&str>,
    monitor: Option<&str>,
    all: bool,
) {
    let session = open_session(core, settings_path, &[]);
    let result = if all {
        session
            .store
            .resolve_all_instances(widget, monitor)
            .map(|configs| print_json(&configs))
    } else {
        session
            .store
            .resolve_effective_config(widget, instance, monitor)
            .map(|config| print_json(&config))
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_wallpaper_resolve(
    core: &CoreConfig,
    settings_path: &Path,
    monitor: &str,
    workspace: Option<&str>,
) {
    let session = open_session(core, settings_path, &[]);
    let document = match session.store.get() {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match resolve_with_source(&document, monitor, workspace) {
        Some((id, source)) => {
            let level = match source {
                WallpaperSource::Workspace => "workspace",
                WallpaperSource::Monitor => "monitor",
                WallpaperSource::Global => "global",
            };
            let name = document.collection(id).map_or("", |c| c.name.as_str());
            println!("{} ({}) from {} level", id, name, level);
        }
        None => println!("No wallpaper collection active"),
    }
}

/// Load, apply `mutate`, save. `mutate` may return a line to print.
fn run_mutation<F>(core: &CoreConfig, settings_path: &Path, mutate: F)
where
    F: FnOnce(&mut ConfigStore) -> Result<Option<String>, shellconf::StoreError>,
{
    let mut session = open_session(core, settings_path, &[]);

    let output = match mutate(&mut session.store) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if session.store.needs_save() {
        if let Err(e) = session.bridge.save(&mut session.store) {
            eprintln!("Error saving settings: {}", e);
            process::exit(1);
        }
    }

    if let Some(line) = output {
        println!("{}", line);
    }
}

fn run_prune(core: &CoreConfig, settings_path: &Path, catalog_path: &Path) {
    let feed = read_catalog(catalog_path);
    let mut session = open_session(core, settings_path, &[]);

    let pruned = session.store.apply_catalog(&feed);
    if !session.store.needs_save() {
        println!("Nothing to prune");
        return;
    }

    if let Err(e) = session.bridge.save(&mut session.store) {
        eprintln!("Error saving settings: {}", e);
        process::exit(1);
    }
    for reference in &pruned {
        println!("pruned {}", reference);
    }
}

fn run_check(core: &CoreConfig, settings_path: &Path, catalog_paths: &[PathBuf], fix: bool) {
    let feeds: Vec<CatalogFeed> = catalog_paths.iter().map(|p| read_catalog(p)).collect();
    let mut session = open_session(core, settings_path, &feeds);

    match session.store.get().map(|document| document.digest()) {
        Ok(Ok(digest)) => println!("digest: {}", digest),
        Ok(Err(e)) => eprintln!("Error computing digest: {}", e),
        Err(e) => eprintln!("Error: {}", e),
    }

    if session.repaired.is_empty() {
        println!("No dangling references");
        return;
    }

    for reference in &session.repaired {
        println!("dangling {}", reference);
    }

    if !fix {
        process::exit(1);
    }
    if let Err(e) = session.bridge.save(&mut session.store) {
        eprintln!("Error saving settings: {}", e);
        process::exit(1);
    }
    println!("Repaired document saved");
}
