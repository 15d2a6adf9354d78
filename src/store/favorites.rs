use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::library::{Track, TrackId};
use crate::resolver::MediaResolver;

use super::Watch;
use super::journal::JsonFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    #[serde(rename = "trackID", default)]
    pub track_id: Option<TrackId>,
    /// Copy of the track at the time it was added.
    pub track: Track,
    pub created_at: DateTime<Utc>,
}

pub struct FavoritesStore {
    file: JsonFile,
    resolver: Arc<dyn MediaResolver>,
    /// Oldest first.
    entries: Mutex<Vec<FavoriteEntry>>,
    watch: Watch<Track>,
}

impl FavoritesStore {
    pub fn open(path: PathBuf, resolver: Arc<dyn MediaResolver>) -> Result<Self, StoreError> {
        let file = JsonFile::new(path);
        let mut entries: Vec<FavoriteEntry> = file.load()?;
        entries.sort_by_key(|e| e.created_at);
        debug!(path = %file.path().display(), entries = entries.len(), "favorites loaded");
        Ok(Self {
            file,
            resolver,
            entries: Mutex::new(entries),
            watch: Watch::default(),
        })
    }

    /// Add `track`. A track that is already a favorite moves to the top.
    pub fn add(&self, track: &Track) -> Result<(), StoreError> {
        let entry = FavoriteEntry {
            track_id: track.id.clone(),
            track: self.resolver.with_resolved_urls(track),
            created_at: Utc::now(),
        };
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            self.file.commit(&mut entries, |entries| {
                if let Some(id) = &entry.track_id {
                    entries.retain(|e| e.track_id.as_ref() != Some(id));
                }
                entries.push(entry);
            })?;
        }
        info!(track = %track.label(), "added to favorites");
        self.notify();
        Ok(())
    }

    /// Returns whether anything was removed.
    pub fn remove(&self, track_id: &str) -> Result<bool, StoreError> {
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let matches = |e: &FavoriteEntry| e.track_id.as_deref() == Some(track_id);
            if !entries.iter().any(matches) {
                return Ok(false);
            }
            self.file.commit(&mut entries, |entries| entries.retain(|e| !matches(e)))?;
        }
        info!(track_id, "removed from favorites");
        self.notify();
        Ok(true)
    }

    pub fn is_favorite(&self, track_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.track_id.as_deref() == Some(track_id))
    }

    /// Most recently added first.
    pub fn tracks(&self) -> Vec<Track> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .map(|e| e.track.clone())
            .collect()
    }

    pub fn observe(&self, on_change: impl Fn(&[Track]) + Send + Sync + 'static) {
        self.watch.set(Arc::new(on_change));
        self.notify();
    }

    pub fn stop_observing(&self) {
        self.watch.clear();
    }

    fn notify(&self) {
        if self.watch.is_set() {
            self.watch.notify(&self.tracks());
        }
    }
}
