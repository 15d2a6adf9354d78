use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::library::{Track, TrackId};
use crate::resolver::MediaResolver;

use super::journal::JsonFile;
use super::{PlayLog, Watch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "trackID", default)]
    pub track_id: Option<TrackId>,
    /// The track as it was played, with its references resolved.
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

/// Plays kept on disk when no capacity is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

pub struct HistoryStore {
    file: JsonFile,
    resolver: Arc<dyn MediaResolver>,
    /// Oldest first.
    entries: Mutex<Vec<HistoryEntry>>,
    /// Oldest plays are dropped past this many; 0 keeps everything.
    capacity: usize,
    limit: Mutex<usize>,
    watch: Watch<Track>,
}

impl HistoryStore {
    pub fn open(path: PathBuf, resolver: Arc<dyn MediaResolver>) -> Result<Self, StoreError> {
        let file = JsonFile::new(path);
        let mut entries: Vec<HistoryEntry> = file.load()?;
        entries.sort_by_key(|e| e.played_at);
        debug!(path = %file.path().display(), entries = entries.len(), "history loaded");
        Ok(Self {
            file,
            resolver,
            entries: Mutex::new(entries),
            capacity: DEFAULT_HISTORY_CAPACITY,
            limit: Mutex::new(0),
            watch: Watch::default(),
        })
    }

    /// Keep at most `capacity` plays (0 for no cap). Applied on the next record.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Most recent first; `limit == 0` means everything.
    pub fn recent(&self, limit: usize) -> Vec<Track> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let take = if limit == 0 { entries.len() } else { limit };
        entries
            .iter()
            .rev()
            .take(take)
            .map(|e| e.track.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the listener. It is called right away with the current list.
    pub fn observe(&self, limit: usize, on_change: impl Fn(&[Track]) + Send + Sync + 'static) {
        *self.limit.lock().unwrap_or_else(PoisonError::into_inner) = limit;
        self.watch.set(Arc::new(on_change));
        self.notify();
    }

    pub fn stop_observing(&self) {
        self.watch.clear();
    }

    fn notify(&self) {
        if !self.watch.is_set() {
            return;
        }
        let limit = *self.limit.lock().unwrap_or_else(PoisonError::into_inner);
        self.watch.notify(&self.recent(limit));
    }
}

impl PlayLog for HistoryStore {
    fn record(&self, track: &Track) -> Result<(), StoreError> {
        let entry = HistoryEntry {
            track_id: track.id.clone(),
            track: self.resolver.with_resolved_urls(track),
            played_at: Utc::now(),
        };
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let capacity = self.capacity;
            self.file.commit(&mut entries, |entries| {
                entries.push(entry);
                if capacity > 0 && entries.len() > capacity {
                    let excess = entries.len() - capacity;
                    entries.drain(..excess);
                }
            })?;
        }
        debug!(track = %track.label(), "play recorded");
        self.notify();
        Ok(())
    }
}
