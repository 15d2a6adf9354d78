use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::PlaybackError;
use crate::library::Track;

use super::interruption::InterruptionHandler;
use super::thread::{SessionConfig, SessionDeps, spawn_audio_thread};
use super::types::{AudioCmd, PlaybackHandle, PlayerSnapshot};

/// Handle to the audio thread. Cheap to share; all methods just send commands.
pub struct AudioPlayer {
    tx: Sender<AudioCmd>,
    playback: PlaybackHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPlayer {
    pub fn new(deps: SessionDeps, config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::channel::<AudioCmd>();
        let playback_info: PlaybackHandle = Arc::new(Mutex::new(PlayerSnapshot::default()));

        let audio_handle = spawn_audio_thread(deps, config, rx, playback_info.clone());

        Self {
            tx,
            playback: playback_info,
            join: Mutex::new(Some(audio_handle)),
        }
    }

    pub fn playback_handle(&self) -> PlaybackHandle {
        self.playback.clone()
    }

    /// Copy of the current player state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.playback
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn sender(&self) -> Sender<AudioCmd> {
        self.tx.clone()
    }

    pub fn send(&self, cmd: AudioCmd) -> Result<(), PlaybackError> {
        self.tx.send(cmd).map_err(|_| PlaybackError::Disconnected)
    }

    pub fn set_queue(&self, tracks: Vec<Track>, start_at: usize) -> Result<(), PlaybackError> {
        self.send(AudioCmd::SetQueue { tracks, start_at })
    }

    pub fn play(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::Play)
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::Pause)
    }

    pub fn toggle(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::TogglePause)
    }

    pub fn seek(&self, to: Duration) -> Result<(), PlaybackError> {
        self.send(AudioCmd::Seek(to))
    }

    pub fn next(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::Next)
    }

    pub fn previous(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::Prev)
    }

    pub fn toggle_shuffle(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::ToggleShuffle)
    }

    pub fn cycle_repeat_mode(&self) -> Result<(), PlaybackError> {
        self.send(AudioCmd::CycleRepeat)
    }

    pub fn interruption_handler(&self) -> InterruptionHandler {
        InterruptionHandler::new(self.tx.clone())
    }

    /// Ask the audio thread to fade out and stop, then wait for it.
    pub fn quit_softly(&self, fade_out: Duration) {
        let _ = self.send(AudioCmd::Quit {
            fade_out_ms: fade_out.as_millis() as u64,
        });

        if let Ok(mut j) = self.join.lock() {
            if let Some(h) = j.take() {
                let _ = h.join();
            }
        }
    }
}
