use std::path::Path;

use lofty::prelude::*;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::config::LibrarySettings;

use super::display::format_clock;
use super::model::Track;

const COVER_NAMES: &[&str] = &["cover.jpg", "cover.png", "folder.jpg", "folder.png"];

fn is_audio_file(path: &Path, settings: &LibrarySettings) -> bool {
    let exts: Vec<String> = settings
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e == &ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn non_blank(v: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Cover image sitting next to the audio file, if any.
fn sibling_cover(path: &Path) -> Option<String> {
    let dir = path.parent()?;
    COVER_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
        .map(|p| p.display().to_string())
}

/// Walk `dir` and build catalog tracks from the audio files found.
///
/// Track ids are the file paths relative to `dir`, so they stay stable across
/// rescans of the same tree. Tags are read with `lofty`; files without tags
/// fall back to the file stem and an unknown performer.
pub fn scan(dir: &Path, settings: &LibrarySettings) -> Vec<Track> {
    let mut tracks: Vec<Track> = Vec::new();

    let mut walker = WalkDir::new(dir).follow_links(settings.follow_links);

    // Non-recursive = only the root directory.
    let depth_cap = if settings.recursive {
        settings.max_depth
    } else {
        Some(1)
    };
    if let Some(d) = depth_cap {
        walker = walker.max_depth(d);
    }

    for entry in walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !path.is_file()
            || (!settings.include_hidden && is_hidden(path))
            || !is_audio_file(path, settings)
        {
            continue;
        }

        let mut name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("UNKNOWN")
            .to_string();
        let mut performer: Option<String> = None;
        let mut album: Option<String> = None;
        let mut duration = String::new();

        match lofty::read_from_path(path) {
            Ok(tagged) => {
                duration = format_clock(tagged.properties().duration());

                if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
                    if let Some(v) = non_blank(tag.title()) {
                        name = v;
                    }
                    performer = non_blank(tag.artist());
                    album = non_blank(tag.album());
                }
            }
            Err(e) => trace!(path = %path.display(), error = %e, "no readable tags"),
        }

        let id = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        tracks.push(Track {
            id: Some(id),
            name,
            performer: performer.unwrap_or_else(|| "Unknown Artist".to_string()),
            album,
            duration,
            audio: path.display().to_string(),
            cover_art: sibling_cover(path),
        });
    }

    tracks.sort_by(|a, b| a.label().to_lowercase().cmp(&b.label().to_lowercase()));
    debug!(dir = %dir.display(), count = tracks.len(), "library scan finished");
    tracks
}
