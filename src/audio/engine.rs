//! Transport over exactly one loaded source at a time.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AudioError;
use crate::resolver::MediaUrl;

use super::output::{AudioFocus, AudioOutput, LoadedSource, SourceEvent};

/// What the engine reports back to the session after applying a source event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Position (and maybe duration) refreshed.
    Tick,
    /// The loaded source finished playing.
    Ended,
}

pub struct PlaybackEngine {
    output: Box<dyn AudioOutput>,
    focus: Box<dyn AudioFocus>,
    tick_interval: Duration,

    media: Option<MediaUrl>,
    source: Option<Arc<dyn LoadedSource>>,
    events: Option<Receiver<SourceEvent>>,

    playing: bool,
    position: Duration,
    duration: Option<Duration>,
    fault: Option<String>,
}

impl PlaybackEngine {
    pub fn new(
        output: Box<dyn AudioOutput>,
        focus: Box<dyn AudioFocus>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            output,
            focus,
            tick_interval,
            media: None,
            source: None,
            events: None,
            playing: false,
            position: Duration::ZERO,
            duration: None,
            fault: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    /// Drop the current source and everything observing it.
    pub fn unload(&mut self) {
        // Unsubscribe first so the old source cannot report anything after this point.
        self.events = None;
        if let Some(old) = self.source.take() {
            old.stop();
        }
        if self.playing {
            self.focus.deactivate();
        }
        self.media = None;
        self.playing = false;
        self.position = Duration::ZERO;
        self.duration = None;
        self.fault = None;
    }

    /// Replace the current source with `media`. Does not start playback.
    pub fn load(&mut self, media: &MediaUrl) -> Result<(), AudioError> {
        self.unload();
        self.media = Some(media.clone());
        self.attach()
    }

    /// Record a failure that happened before anything reached the engine.
    pub fn set_fault(&mut self, fault: impl Into<String>) {
        self.fault = Some(fault.into());
    }

    fn attach(&mut self) -> Result<(), AudioError> {
        let Some(media) = self.media.clone() else {
            return Ok(());
        };
        match self.output.open(&media) {
            Ok(source) => {
                self.duration = source.duration();
                self.events = Some(self.output.watch(Arc::clone(&source), self.tick_interval));
                self.source = Some(source);
                self.fault = None;
                debug!(media = %media, "source loaded");
                Ok(())
            }
            Err(e) => {
                warn!(media = %media, error = %e, "source failed to load");
                self.fault = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Reopen the current media from the start, e.g. after it played to the end.
    fn reload(&mut self) -> Result<(), AudioError> {
        self.events = None;
        if let Some(old) = self.source.take() {
            old.stop();
        }
        if self.playing {
            self.focus.deactivate();
        }
        self.playing = false;
        self.position = Duration::ZERO;
        self.attach()
    }

    /// Start or resume. Returns whether the engine is now playing.
    pub fn play(&mut self) -> bool {
        let Some(source) = self.source.as_ref() else {
            return false;
        };
        if self.playing {
            return true;
        }
        if let Err(e) = self.focus.activate() {
            warn!(error = %e, "audio focus activation failed, not playing");
            return false;
        }
        source.play();
        self.playing = true;
        true
    }

    pub fn pause(&mut self) {
        if let Some(source) = self.source.as_ref() {
            source.pause();
        }
        if self.playing {
            self.focus.deactivate();
        }
        self.playing = false;
    }

    pub fn toggle(&mut self) -> bool {
        if self.playing {
            self.pause();
            false
        } else {
            self.play()
        }
    }

    /// Move the head to `to` and return the position once the seek completed.
    ///
    /// A source that already finished is reopened first, paused.
    pub fn seek(&mut self, to: Duration) -> Result<Duration, AudioError> {
        let finished = self.source.as_ref().is_some_and(|s| s.is_finished());
        if finished {
            self.reload()?;
        }
        let Some(source) = self.source.as_ref() else {
            return Ok(self.position);
        };
        source.seek(to)?;
        self.position = to;
        Ok(to)
    }

    /// Apply the next pending source event, if any.
    pub fn poll_event(&mut self) -> Option<EngineEvent> {
        let rx = self.events.as_ref()?;
        match rx.try_recv() {
            Ok(SourceEvent::Tick { position, duration }) => {
                self.position = position;
                if let Some(d) = duration.filter(|d| !d.is_zero()) {
                    self.duration = Some(d);
                }
                Some(EngineEvent::Tick)
            }
            Ok(SourceEvent::Ended) => {
                if let Some(d) = self.duration {
                    self.position = d;
                }
                Some(EngineEvent::Ended)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.events = None;
                None
            }
        }
    }

    /// Ramp the volume down over `fade_out` before stopping.
    pub fn fade_out(&mut self, fade_out: Duration) {
        if let Some(source) = self.source.as_ref() {
            if self.playing && !fade_out.is_zero() {
                let steps: u32 = 20;
                let step = (fade_out / steps).max(Duration::from_millis(1));
                for i in 1..=steps {
                    source.set_volume(1.0 - i as f32 / steps as f32);
                    thread::sleep(step);
                }
            }
            source.set_volume(0.0);
        }
        self.unload();
    }
}
