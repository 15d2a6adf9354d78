use serde::{Deserialize, Serialize};

/// Stable catalog identifier of a track.
pub type TrackId = String;

/// A playable track as served by the catalog.
///
/// Field names follow the catalog document format so exported documents
/// deserialize as-is. `id` is absent for entries assembled locally, e.g.
/// from the downloads index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TrackId>,
    #[serde(rename = "trackName")]
    pub name: String,
    #[serde(rename = "performerName")]
    pub performer: String,
    #[serde(rename = "albumName", default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Human-readable length, e.g. `03:30`.
    #[serde(default)]
    pub duration: String,
    /// Audio reference: absolute URL, local path or an object-storage path.
    #[serde(rename = "audioURL")]
    pub audio: String,
    #[serde(rename = "coverArtURL", default, skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
}

impl Track {
    /// `Performer - Name`, or just the name when the performer is blank.
    pub fn label(&self) -> String {
        match self.performer.trim() {
            "" => self.name.trim().to_string(),
            p => format!("{} - {}", p, self.name.trim()),
        }
    }

    /// Two tracks denote the same recording: same id, or (both id-less)
    /// same name and performer.
    pub fn same_recording(&self, other: &Track) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name && self.performer == other.performer,
            _ => false,
        }
    }
}

/// A named, ordered selection of catalog tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Playback order.
    #[serde(rename = "tracksIDs", alias = "trackIDs", default)]
    pub tracks_ids: Vec<TrackId>,
    #[serde(rename = "coverArtURL", default, skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub info: String,
    /// Photo reference, resolved the same way as cover art.
    #[serde(default)]
    pub photo: String,
}
