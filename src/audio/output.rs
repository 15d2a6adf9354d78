//! Seams between the playback engine and the platform audio stack.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::error::AudioError;
use crate::resolver::MediaUrl;

/// Events produced while a source is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent {
    Tick {
        position: Duration,
        duration: Option<Duration>,
    },
    /// The playback head reached the end. Sent at most once per source.
    Ended,
}

/// One opened media source.
pub trait LoadedSource: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    /// Reposition the head. Returns once the seek has been applied.
    fn seek(&self, to: Duration) -> Result<(), AudioError>;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn is_finished(&self) -> bool;
    fn set_volume(&self, _volume: f32) {}
}

/// Opens sources on an audio device.
pub trait AudioOutput {
    fn open(&mut self, media: &MediaUrl) -> Result<Arc<dyn LoadedSource>, AudioError>;

    /// Subscribe to `source`'s ticks and end-of-media.
    ///
    /// Dropping the returned receiver ends the subscription.
    fn watch(&self, source: Arc<dyn LoadedSource>, interval: Duration) -> Receiver<SourceEvent> {
        spawn_watcher(source, interval)
    }
}

/// Poll `source` every `interval` on a background thread.
///
/// The thread exits as soon as the receiver is gone.
pub fn spawn_watcher(source: Arc<dyn LoadedSource>, interval: Duration) -> Receiver<SourceEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut ended = false;
        loop {
            thread::sleep(interval);
            let tick = SourceEvent::Tick {
                position: source.position(),
                duration: source.duration(),
            };
            if tx.send(tick).is_err() {
                break;
            }
            if !ended && source.is_finished() {
                ended = true;
                if tx.send(SourceEvent::Ended).is_err() {
                    break;
                }
            }
        }
        trace!("source watcher stopped");
    });
    rx
}

/// Host audio-focus negotiation.
pub trait AudioFocus: Send {
    fn activate(&mut self) -> Result<(), AudioError>;
    fn deactivate(&mut self) {}
}

/// Desktop mixers share the device; focus is always granted.
#[derive(Debug, Default)]
pub struct SharedFocus;

impl AudioFocus for SharedFocus {
    fn activate(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Output used when no device could be opened: every load fails.
#[derive(Debug)]
pub struct NullOutput {
    reason: String,
}

impl NullOutput {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioOutput for NullOutput {
    fn open(&mut self, _media: &MediaUrl) -> Result<Arc<dyn LoadedSource>, AudioError> {
        Err(AudioError::NoDevice(self.reason.clone()))
    }
}
