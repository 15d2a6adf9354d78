use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::library::{Track, TrackId};
use crate::resolver::{MediaResolver, MediaUrl};

use super::Watch;
use super::journal::JsonFile;

const DEFAULT_EXTENSION: &str = "m4a";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntry {
    #[serde(rename = "trackID")]
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(rename = "coverArtURL", default)]
    pub cover_art: Option<String>,
    pub local_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl DownloadEntry {
    /// A playable track pointing at the local copy.
    pub fn to_track(&self) -> Track {
        Track {
            id: Some(self.track_id.clone()),
            name: self.title.clone(),
            performer: self.artist.clone(),
            album: self.album.clone(),
            duration: String::new(),
            audio: self.local_path.display().to_string(),
            cover_art: self.cover_art.clone(),
        }
    }
}

pub struct DownloadsStore {
    file: JsonFile,
    dir: PathBuf,
    resolver: Arc<dyn MediaResolver>,
    http: reqwest::blocking::Client,
    /// Oldest first.
    entries: Mutex<Vec<DownloadEntry>>,
    watch: Watch<DownloadEntry>,
}

impl DownloadsStore {
    pub fn open(
        index: PathBuf,
        dir: PathBuf,
        resolver: Arc<dyn MediaResolver>,
    ) -> Result<Self, StoreError> {
        let file = JsonFile::new(index);
        let mut entries: Vec<DownloadEntry> = file.load()?;
        entries.sort_by_key(|e| e.created_at);
        let http = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Download(format!("http client: {e}")))?;
        debug!(path = %file.path().display(), entries = entries.len(), "downloads index loaded");
        Ok(Self {
            file,
            dir,
            resolver,
            http,
            entries: Mutex::new(entries),
            watch: Watch::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch the audio of `track` into the downloads directory and index it.
    ///
    /// A file that is already present is only re-indexed.
    pub fn download(&self, track: &Track) -> Result<DownloadEntry, StoreError> {
        let id = track.id.clone().ok_or(StoreError::MissingId)?;
        let media = self.resolver.resolve(&track.audio)?;
        let dest = self.dir.join(format!("{}.{}", file_stem(&id), extension_of(&media)));

        if dest.exists() {
            debug!(path = %dest.display(), "already downloaded");
        } else {
            fs::create_dir_all(&self.dir)?;
            let tmp = dest.with_extension("part");
            let fetched = match &media {
                MediaUrl::Local(src) => fs::copy(src, &tmp).map(|_| ()).map_err(StoreError::from),
                MediaUrl::Remote(url) => self.fetch(url, &tmp),
            };
            if let Err(e) = fetched {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
            fs::rename(&tmp, &dest)?;
            info!(track = %track.label(), path = %dest.display(), "downloaded");
        }

        let entry = self.index(track, id, dest)?;
        self.notify();
        Ok(entry)
    }

    fn fetch(&self, url: &url::Url, to: &Path) -> Result<(), StoreError> {
        let fail = |e: reqwest::Error| StoreError::Download(format!("{url}: {e}"));
        let mut resp = self
            .http
            .get(url.clone())
            .send()
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?;
        let mut out = fs::File::create(to)?;
        resp.copy_to(&mut out).map_err(fail)?;
        Ok(())
    }

    /// Create or refresh the index entry for `id`.
    fn index(
        &self,
        track: &Track,
        id: TrackId,
        path: PathBuf,
    ) -> Result<DownloadEntry, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        self.file.commit(&mut entries, |entries| {
            let entry = match entries.iter().position(|e| e.track_id == id) {
                Some(i) => {
                    let mut entry = entries.remove(i);
                    entry.local_path = path;
                    entry.created_at = Utc::now();
                    entry
                }
                None => DownloadEntry {
                    track_id: id,
                    title: track.name.clone(),
                    artist: track.performer.clone(),
                    album: track.album.clone(),
                    cover_art: track.cover_art.clone(),
                    local_path: path,
                    created_at: Utc::now(),
                },
            };
            entries.push(entry.clone());
            entry
        })
    }

    /// Drop the index entry, then delete its file. Returns whether an entry existed.
    pub fn remove(&self, track_id: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(i) = entries.iter().position(|e| e.track_id == track_id) else {
                return Ok(false);
            };
            self.file.commit(&mut entries, |entries| entries.remove(i))?
        };
        match fs::remove_file(&removed.local_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %removed.local_path.display(),
                error = %e,
                "could not delete download"
            ),
        }
        info!(track_id = %removed.track_id, "download removed");
        self.notify();
        Ok(true)
    }

    pub fn is_downloaded(&self, track_id: &str) -> bool {
        self.local_path_for(track_id).is_some()
    }

    /// The local file for `track_id`, if it is indexed and still on disk.
    pub fn local_path_for(&self, track_id: &str) -> Option<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.track_id == track_id)
            .map(|e| e.local_path.clone())
            .filter(|p| p.exists())
    }

    /// Indexed downloads, most recent first. Entries whose file is gone are dropped.
    pub fn entries(&self) -> Result<Vec<DownloadEntry>, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|e| !e.local_path.exists()) {
            self.file.commit(&mut entries, |entries| {
                entries.retain(|e| {
                    let present = e.local_path.exists();
                    if !present {
                        debug!(track_id = %e.track_id, "pruning download with missing file");
                    }
                    present
                })
            })?;
        }
        Ok(entries.iter().rev().cloned().collect())
    }

    pub fn observe(&self, on_change: impl Fn(&[DownloadEntry]) + Send + Sync + 'static) {
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
        match self.entries() {
            Ok(entries) => self.watch.notify(&entries),
            Err(e) => {
                warn!(error = %e, "downloads listing failed");
                self.watch.notify(&[]);
            }
        }
    }
}

fn extension_of(media: &MediaUrl) -> String {
    let ext = match media {
        MediaUrl::Local(path) => path
            .extension()
            .map(|e| e.to_string_lossy().into_owned()),
        MediaUrl::Remote(url) => url
            .path_segments()
            .and_then(|mut s| s.next_back())
            // Object paths arrive percent-encoded as one segment.
            .and_then(|last| last.rsplit("%2F").next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string()),
    };
    ext.filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Track ids become file names; keep them to one path component.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}
