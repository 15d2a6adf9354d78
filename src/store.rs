//! Listening history, favorites and offline downloads.
//!
//! Each store keeps its entries in memory and persists them as one JSON
//! document under the data directory. Observers get the whole list (most
//! recent first) immediately and again after every change.

mod downloads;
mod favorites;
mod history;
mod journal;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreError;
use crate::library::Track;
use crate::resolver::MediaResolver;

pub use downloads::{DownloadEntry, DownloadsStore};
pub use favorites::{FavoriteEntry, FavoritesStore};
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryEntry, HistoryStore};

/// Where the session reports that a track started playing.
pub trait PlayLog: Send + Sync {
    fn record(&self, track: &Track) -> Result<(), StoreError>;
}

type Callback<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

/// A single replaceable change listener.
struct Watch<T> {
    slot: Mutex<Option<Callback<T>>>,
}

impl<T> Default for Watch<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Watch<T> {
    fn set(&self, callback: Callback<T>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs the listener outside the lock so it may call back into the store.
    fn notify(&self, items: &[T]) {
        let callback = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(items);
        }
    }
}

/// The three stores, opened from one data directory.
pub struct Library {
    pub history: Arc<HistoryStore>,
    pub favorites: FavoritesStore,
    pub downloads: DownloadsStore,
}

impl Library {
    pub fn open(
        data_dir: &Path,
        downloads_dir: &Path,
        history_capacity: usize,
        resolver: Arc<dyn MediaResolver>,
    ) -> Result<Self, StoreError> {
        let history = HistoryStore::open(data_dir.join("history.json"), Arc::clone(&resolver))?
            .with_capacity(history_capacity);
        Ok(Self {
            history: Arc::new(history),
            favorites: FavoritesStore::open(
                data_dir.join("favorites.json"),
                Arc::clone(&resolver),
            )?,
            downloads: DownloadsStore::open(
                data_dir.join("downloads.json"),
                downloads_dir.to_path_buf(),
                resolver,
            )?,
        })
    }
}
