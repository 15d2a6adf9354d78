//! Media resource resolution.
//!
//! Tracks carry opaque references to their audio and cover art: absolute
//! URLs, local paths, or object-storage paths. The resolver turns them into
//! locations the audio output (or an OS media surface) can open.

use std::path::{Path, PathBuf};

use tracing::warn;
use url::Url;

use crate::error::ResolveError;
use crate::library::Track;

/// A resolved, playable media location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaUrl {
    /// `http`/`https` URL, streamed over the network.
    Remote(Url),
    /// A file on the local filesystem.
    Local(PathBuf),
}

impl MediaUrl {
    /// URL form, as published to `mpris:artUrl` / `xesam:url`.
    pub fn as_uri(&self) -> String {
        match self {
            Self::Remote(u) => u.to_string(),
            Self::Local(p) => Url::from_file_path(p)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| format!("file://{}", p.display())),
        }
    }
}

impl std::fmt::Display for MediaUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(u) => write!(f, "{u}"),
            Self::Local(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Result of resolving both references of one track.
///
/// Either half may fail without affecting the other.
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    pub track: Track,
    pub audio: Result<MediaUrl, ResolveError>,
    pub cover: Option<MediaUrl>,
}

impl ResolvedTrack {
    /// The track with every reference that resolved written back in place.
    pub fn into_track(self) -> Track {
        let mut out = self.track;
        if let Ok(audio) = self.audio {
            out.audio = audio.to_string();
        }
        if let Some(cover) = self.cover {
            out.cover_art = Some(cover.as_uri());
        }
        out
    }
}

pub trait MediaResolver: Send + Sync {
    fn resolve(&self, raw: &str) -> Result<MediaUrl, ResolveError>;

    /// Resolve the audio and cover references of `track`.
    ///
    /// A cover that fails to resolve is logged and dropped.
    fn resolve_track(&self, track: &Track) -> ResolvedTrack {
        let audio = self.resolve(&track.audio);
        if let Err(e) = &audio {
            warn!(track = %track.label(), error = %e, "audio reference did not resolve");
        }

        let cover = track
            .cover_art
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .and_then(|c| match self.resolve(c) {
                Ok(u) => Some(u),
                Err(e) => {
                    warn!(track = %track.label(), error = %e, "cover reference did not resolve");
                    None
                }
            });

        ResolvedTrack {
            track: track.clone(),
            audio,
            cover,
        }
    }

    /// Batch form of [`MediaResolver::resolve_track`]; never fails as a whole.
    fn resolve_tracks(&self, tracks: &[Track]) -> Vec<ResolvedTrack> {
        tracks.iter().map(|t| self.resolve_track(t)).collect()
    }

    /// Copy of `track` with resolved references written back in place.
    ///
    /// References that fail to resolve are kept as they were.
    fn with_resolved_urls(&self, track: &Track) -> Track {
        self.resolve_track(track).into_track()
    }
}

fn has_web_scheme(raw: &str) -> bool {
    let lower = raw.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolver for a bucket-style object store plus local files.
///
/// - `http(s)://` references are already resolved.
/// - `file://` URLs and absolute paths are local files.
/// - Anything else is an object path: it is percent-encoded as a single
///   segment and joined onto `base_url` (`?alt=media` is appended, the way
///   bucket download URLs are shaped), or joined onto `media_root` when no
///   base URL is configured.
#[derive(Debug, Clone, Default)]
pub struct StorageResolver {
    base_url: Option<Url>,
    media_root: Option<PathBuf>,
}

impl StorageResolver {
    pub fn new(base_url: Option<Url>, media_root: Option<PathBuf>) -> Self {
        Self {
            base_url,
            media_root,
        }
    }

    /// Build from settings strings; an unparsable base URL is logged and ignored.
    pub fn from_settings(base_url: Option<&str>, media_root: Option<&Path>) -> Self {
        let base_url = base_url.and_then(|b| match Url::parse(b) {
            Ok(u) => Some(u),
            Err(e) => {
                warn!(base_url = b, error = %e, "ignoring invalid storage base url");
                None
            }
        });
        Self::new(base_url, media_root.map(Path::to_path_buf))
    }

    fn object_url(base: &Url, object: &str) -> Result<Url, ResolveError> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| ResolveError::Invalid {
                reference: object.to_string(),
                reason: "base url cannot carry a path".to_string(),
            })?;
            segments.pop_if_empty().push(object);
        }
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

impl MediaResolver for StorageResolver {
    fn resolve(&self, raw: &str) -> Result<MediaUrl, ResolveError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResolveError::Empty);
        }

        if has_web_scheme(raw) {
            return Url::parse(raw)
                .map(MediaUrl::Remote)
                .map_err(|e| ResolveError::Invalid {
                    reference: raw.to_string(),
                    reason: e.to_string(),
                });
        }

        if raw.starts_with("file://") {
            let url = Url::parse(raw).map_err(|e| ResolveError::Invalid {
                reference: raw.to_string(),
                reason: e.to_string(),
            })?;
            return url
                .to_file_path()
                .map(MediaUrl::Local)
                .map_err(|_| ResolveError::Invalid {
                    reference: raw.to_string(),
                    reason: "not a local file url".to_string(),
                });
        }

        let path = Path::new(raw);
        if path.is_absolute() {
            return Ok(MediaUrl::Local(path.to_path_buf()));
        }

        let object = raw.trim_start_matches('/');
        if let Some(base) = &self.base_url {
            return Self::object_url(base, object).map(MediaUrl::Remote);
        }
        if let Some(root) = &self.media_root {
            return Ok(MediaUrl::Local(root.join(object)));
        }

        Err(ResolveError::NoStorage(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(audio: &str, cover: Option<&str>) -> Track {
        Track {
            id: Some("t1".into()),
            name: "Song".into(),
            performer: "Artist".into(),
            album: None,
            duration: "03:00".into(),
            audio: audio.into(),
            cover_art: cover.map(str::to_string),
        }
    }

    fn bucket() -> StorageResolver {
        StorageResolver::from_settings(
            Some("https://storage.example.com/v0/b/app.appspot.com/o/"),
            None,
        )
    }

    #[test]
    fn web_urls_are_pre_resolved_case_insensitively() {
        let r = StorageResolver::default();
        assert_eq!(
            r.resolve("HTTPS://cdn.example.com/a.mp3").unwrap().to_string(),
            "https://cdn.example.com/a.mp3"
        );
    }

    #[test]
    fn storage_paths_join_onto_bucket_as_one_encoded_segment() {
        let url = bucket().resolve("tracks/demo song.m4a").unwrap();
        assert_eq!(
            url.to_string(),
            "https://storage.example.com/v0/b/app.appspot.com/o/tracks%2Fdemo%20song.m4a?alt=media"
        );
    }

    #[test]
    fn local_paths_and_file_urls_resolve_locally() {
        let r = StorageResolver::default();
        assert_eq!(
            r.resolve("/music/a.flac").unwrap(),
            MediaUrl::Local(PathBuf::from("/music/a.flac"))
        );
        assert_eq!(
            r.resolve("file:///music/b.flac").unwrap(),
            MediaUrl::Local(PathBuf::from("/music/b.flac"))
        );

        let rooted = StorageResolver::new(None, Some(PathBuf::from("/srv/media")));
        assert_eq!(
            rooted.resolve("tracks/c.mp3").unwrap(),
            MediaUrl::Local(PathBuf::from("/srv/media/tracks/c.mp3"))
        );
    }

    #[test]
    fn relative_reference_without_storage_fails() {
        let r = StorageResolver::default();
        assert_eq!(
            r.resolve("tracks/a.mp3"),
            Err(ResolveError::NoStorage("tracks/a.mp3".into()))
        );
        assert_eq!(r.resolve("  "), Err(ResolveError::Empty));
    }

    #[test]
    fn batch_resolution_tolerates_partial_failure() {
        let r = StorageResolver::default();
        let tracks = vec![
            track("https://cdn.example.com/a.mp3", Some("covers/a.jpg")),
            track("tracks/b.mp3", Some("https://cdn.example.com/b.jpg")),
        ];

        let out = r.resolve_tracks(&tracks);
        assert_eq!(out.len(), 2);
        // Cover failed, audio survives.
        assert!(out[0].audio.is_ok());
        assert!(out[0].cover.is_none());
        // Audio failed, cover survives.
        assert!(out[1].audio.is_err());
        assert!(out[1].cover.is_some());
    }

    #[test]
    fn with_resolved_urls_keeps_unresolvable_references() {
        let r = bucket();
        let out = r.with_resolved_urls(&track("tracks/a.mp3", Some("")));
        assert!(out.audio.starts_with("https://storage.example.com/"));
        assert_eq!(out.cover_art.as_deref(), Some(""));
    }

    #[test]
    fn local_uri_form_is_a_file_url() {
        assert_eq!(
            MediaUrl::Local(PathBuf::from("/music/a b.mp3")).as_uri(),
            "file:///music/a%20b.mp3"
        );
    }
}
