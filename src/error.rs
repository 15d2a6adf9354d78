//! Error types shared across the playback core and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Failures opening or driving an audio source.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device: {0}")]
    NoDevice(String),

    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode {0}")]
    Decode(String),

    #[error("seek failed: {0}")]
    Seek(String),

    #[error("audio focus unavailable: {0}")]
    Focus(String),
}

/// A media reference that could not be turned into a playable location.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("empty media reference")]
    Empty,

    #[error("no storage location configured for {0:?}")]
    NoStorage(String),

    #[error("invalid media reference {reference:?}: {reason}")]
    Invalid { reference: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog document is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("track has no id")]
    MissingId,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("download failed: {0}")]
    Download(String),
}

/// Errors reported by the queue/session manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no active playback session")]
    NoActiveSession,

    #[error("player is gone")]
    Disconnected,
}
