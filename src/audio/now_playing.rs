//! What the session publishes to an OS media-control surface.

use std::time::Duration;

use crate::library::Track;

use super::types::PlaybackPolicy;

/// Transport state as shown by media controls.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Track metadata half of the now-playing descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub queue_index: usize,
    pub track_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<Duration>,
    /// Playable location of the audio, when it resolved.
    pub url: Option<String>,
    /// Filled in later, once artwork resolution finishes.
    pub art_url: Option<String>,
}

impl NowPlaying {
    pub fn for_track(queue_index: usize, track: &Track) -> Self {
        Self {
            queue_index,
            track_id: track.id.clone(),
            title: track.name.clone(),
            artist: track.performer.clone(),
            album: track.album.clone(),
            duration: None,
            url: None,
            art_url: None,
        }
    }
}

/// Cheap, frequently republished half of the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Progress {
    pub transport: Transport,
    pub elapsed: Duration,
    /// 1.0 while playing, 0.0 otherwise.
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub policy: PlaybackPolicy,
    pub can_go_next: bool,
    pub can_go_previous: bool,
}

/// An OS media-control surface owned by one session.
///
/// The session calls [`NowPlayingSink::release`] exactly when it is disposed;
/// after that the surface must not route commands to it anymore.
pub trait NowPlayingSink: Send {
    fn publish_track(&mut self, descriptor: &NowPlaying);
    fn merge_artwork(&mut self, art_url: &str);
    fn publish_progress(&mut self, progress: Progress);
    fn publish_capabilities(&mut self, caps: Capabilities);
    /// The head jumped (seek, restart). `position` is the new elapsed time.
    fn seeked(&mut self, position: Duration);
    /// No track anymore.
    fn clear(&mut self);
    fn release(&mut self);
}

/// Sink for sessions that are not bound to any OS surface.
#[derive(Debug, Default)]
pub struct Detached;

impl NowPlayingSink for Detached {
    fn publish_track(&mut self, _descriptor: &NowPlaying) {}
    fn merge_artwork(&mut self, _art_url: &str) {}
    fn publish_progress(&mut self, _progress: Progress) {}
    fn publish_capabilities(&mut self, _caps: Capabilities) {}
    fn seeked(&mut self, _position: Duration) {}
    fn clear(&mut self) {}
    fn release(&mut self) {}
}
