use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LibrarySettings;
use crate::error::CatalogError;
use crate::resolver::{MediaResolver, ResolvedTrack};

use super::model::{Artist, Playlist, Track, TrackId};
use super::scan::scan;

/// Source of catalog tracks, playlists and artists.
pub trait TrackCatalog: Send + Sync {
    /// Every track in the catalog.
    fn all_tracks(&self) -> Result<Vec<Track>, CatalogError>;

    /// Tracks for `ids`, in the order the ids were given. Unknown ids are dropped.
    fn tracks_by_ids(&self, ids: &[TrackId]) -> Result<Vec<Track>, CatalogError>;

    fn playlists(&self) -> Result<Vec<Playlist>, CatalogError>;

    /// Up to `limit` artists; 0 means all of them.
    fn artists(&self, limit: usize) -> Result<Vec<Artist>, CatalogError>;

    /// The first playlist called exactly `name`.
    fn playlist(&self, name: &str) -> Result<Option<Playlist>, CatalogError> {
        let found = self.playlists()?.into_iter().find(|p| p.name == name);
        if found.is_none() {
            debug!(name, "no such playlist");
        }
        Ok(found)
    }

    /// The playlist's tracks in playlist order, with their references resolved.
    ///
    /// A reference that does not resolve is kept as it was.
    fn tracks_for(
        &self,
        playlist: &Playlist,
        resolver: &dyn MediaResolver,
    ) -> Result<Vec<Track>, CatalogError> {
        if playlist.tracks_ids.is_empty() {
            return Ok(Vec::new());
        }
        let tracks = self.tracks_by_ids(&playlist.tracks_ids)?;
        Ok(resolver
            .resolve_tracks(&tracks)
            .into_iter()
            .map(ResolvedTrack::into_track)
            .collect())
    }

    /// Like [`TrackCatalog::artists`], with photo references resolved.
    fn artists_with_photos(
        &self,
        limit: usize,
        resolver: &dyn MediaResolver,
    ) -> Result<Vec<Artist>, CatalogError> {
        let mut artists = self.artists(limit)?;
        for artist in artists.iter_mut().filter(|a| !a.photo.trim().is_empty()) {
            match resolver.resolve(&artist.photo) {
                Ok(url) => artist.photo = url.as_uri(),
                Err(e) => warn!(artist = %artist.name, error = %e, "photo did not resolve"),
            }
        }
        Ok(artists)
    }
}

/// A catalog document: a bare track array, or tracks with playlists and artists.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Tracks(Vec<Track>),
    Full {
        tracks: Vec<Track>,
        #[serde(default)]
        playlists: Vec<Playlist>,
        #[serde(default)]
        artists: Vec<Artist>,
    },
}

/// Case-insensitive substring match on name, performer and album.
///
/// A blank query matches everything.
pub fn search_locally(query: &str, corpus: &[Track]) -> Vec<Track> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return corpus.to_vec();
    }

    corpus
        .iter()
        .filter(|t| {
            t.name.to_lowercase().contains(&q)
                || t.performer.to_lowercase().contains(&q)
                || t.album
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(&q))
        })
        .cloned()
        .collect()
}

/// In-memory catalog, filled from a directory scan or a JSON document.
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    tracks: Vec<Track>,
    by_id: HashMap<TrackId, usize>,
    playlists: Vec<Playlist>,
    artists: Vec<Artist>,
}

impl LocalCatalog {
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        let by_id = tracks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.id.clone().map(|id| (id, i)))
            .collect();
        Self {
            tracks,
            by_id,
            playlists: Vec::new(),
            artists: Vec::new(),
        }
    }

    pub fn with_playlists(mut self, playlists: Vec<Playlist>) -> Self {
        self.playlists = playlists;
        self
    }

    pub fn with_artists(mut self, artists: Vec<Artist>) -> Self {
        self.artists = artists;
        self
    }

    pub fn scan(dir: &Path, settings: &LibrarySettings) -> Self {
        Self::from_tracks(scan(dir, settings))
    }

    /// Load a catalog document: a JSON array of tracks, or an object with
    /// `tracks` and optional `playlists` and `artists`.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(match serde_json::from_str(&raw)? {
            CatalogDocument::Tracks(tracks) => Self::from_tracks(tracks),
            CatalogDocument::Full {
                tracks,
                playlists,
                artists,
            } => Self::from_tracks(tracks)
                .with_playlists(playlists)
                .with_artists(artists),
        })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl TrackCatalog for LocalCatalog {
    fn all_tracks(&self) -> Result<Vec<Track>, CatalogError> {
        Ok(self.tracks.clone())
    }

    fn tracks_by_ids(&self, ids: &[TrackId]) -> Result<Vec<Track>, CatalogError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|&i| self.tracks[i].clone()))
            .collect())
    }

    fn playlists(&self) -> Result<Vec<Playlist>, CatalogError> {
        Ok(self.playlists.clone())
    }

    fn artists(&self, limit: usize) -> Result<Vec<Artist>, CatalogError> {
        let take = if limit == 0 { self.artists.len() } else { limit };
        Ok(self.artists.iter().take(take).cloned().collect())
    }
}
