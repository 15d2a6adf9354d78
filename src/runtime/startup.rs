use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::audio::{PlaybackPolicy, SessionConfig};
use crate::config;
use crate::error::CatalogError;
use crate::library::LocalCatalog;

/// Session timing and the initial shuffle/repeat policy.
pub fn session_config(settings: &config::Settings) -> SessionConfig {
    SessionConfig {
        tick_interval: Duration::from_millis(settings.audio.tick_interval_ms),
        poll_interval: Duration::from_millis(settings.audio.poll_interval_ms),
        skip_interval: Duration::from_secs(settings.remote.skip_interval_secs),
        policy: PlaybackPolicy {
            shuffle: settings.playback.shuffle,
            repeat: settings.playback.repeat_mode.into(),
        },
    }
}

/// A directory argument is scanned; otherwise the configured JSON catalog is
/// read, and failing both the current directory is scanned.
pub fn load_catalog(
    dir_arg: Option<String>,
    settings: &config::Settings,
) -> Result<LocalCatalog, CatalogError> {
    if dir_arg.is_none() {
        if let Some(file) = &settings.storage.catalog_file {
            let catalog = LocalCatalog::from_json_file(file)?;
            info!(file = %file.display(), tracks = catalog.len(), "catalog loaded");
            return Ok(catalog);
        }
    }

    let dir = dir_arg
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("Music"));
    let catalog = LocalCatalog::scan(Path::new(&dir), &settings.library);
    info!(dir = %dir.display(), tracks = catalog.len(), "library scanned");
    Ok(catalog)
}
