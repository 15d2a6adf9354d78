//! Audio-related small types and handles.
//!
//! This module defines the playback policy, the commands accepted by the
//! audio thread and the snapshot it shares with observers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::RepeatModeSetting;
use crate::library::Track;

use super::interruption::Interruption;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Stop at the end of the queue.
    #[default]
    Off,
    /// Wrap around to the start of the queue.
    All,
    /// Repeat the current track when it ends.
    One,
}

impl RepeatMode {
    /// `Off -> All -> One -> Off`.
    pub fn cycled(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

impl From<RepeatModeSetting> for RepeatMode {
    fn from(s: RepeatModeSetting) -> Self {
        match s {
            RepeatModeSetting::Off => Self::Off,
            RepeatModeSetting::All => Self::All,
            RepeatModeSetting::One => Self::One,
        }
    }
}

/// User preference that survives track changes and queue replacement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PlaybackPolicy {
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

#[derive(Debug)]
pub enum AudioCmd {
    /// Replace the queue and start playing at `start_at`.
    SetQueue { tracks: Vec<Track>, start_at: usize },
    Play,
    Pause,
    /// Toggle pause/resume.
    TogglePause,
    /// Pause and rewind the current track.
    Stop,
    /// Seek to an absolute position in the current track.
    Seek(Duration),
    /// Seek relative to the current position (milliseconds, positive or negative).
    SeekBy(i64),
    /// Jump forward by the configured skip interval.
    SkipForward,
    /// Jump backward by the configured skip interval.
    SkipBackward,
    Next,
    Prev,
    ToggleShuffle,
    SetShuffle(bool),
    /// Cycle `Off -> All -> One`.
    CycleRepeat,
    SetRepeatMode(RepeatMode),
    /// OS audio interruption (incoming call and the like).
    Interruption(Interruption),
    /// Quit the audio thread, optionally fading out over `fade_out_ms` milliseconds.
    Quit { fade_out_ms: u64 },
}

/// Observable player state shared with the UI layer.
#[derive(Debug, Clone, Default)]
pub struct PlayerSnapshot {
    pub is_playing: bool,
    pub current_time: Duration,
    /// Unknown until the loaded media reports it.
    pub duration: Option<Duration>,
    pub current_index: Option<usize>,
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub policy: PlaybackPolicy,
    pub can_go_next: bool,
    pub can_go_previous: bool,
    /// Last load/playback failure of the current track, if any.
    pub fault: Option<String>,
}

pub type PlaybackHandle = Arc<Mutex<PlayerSnapshot>>;
