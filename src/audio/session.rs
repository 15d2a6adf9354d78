//! The queue/session manager: the single owner of queue, policy and transport.
//!
//! Everything here runs on the audio thread. Other threads talk to it through
//! `AudioCmd`s and observe it through the shared `PlayerSnapshot`.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::error::PlaybackError;
use crate::library::{Track, parse_clock};
use crate::resolver::{MediaResolver, MediaUrl};
use crate::store::PlayLog;

use super::engine::{EngineEvent, PlaybackEngine};
use super::interruption::Interruption;
use super::now_playing::{Capabilities, NowPlaying, NowPlayingSink, Progress, Transport};
use super::queue::{Queue, Step};
use super::types::{AudioCmd, PlaybackHandle, PlaybackPolicy, RepeatMode};

pub struct Session {
    engine: PlaybackEngine,
    queue: Queue,
    policy: PlaybackPolicy,
    resolver: Arc<dyn MediaResolver>,
    now_playing: Box<dyn NowPlayingSink>,
    history: Option<Arc<dyn PlayLog>>,
    snapshot: PlaybackHandle,
    rng: StdRng,
    skip_interval: Duration,

    descriptor: Option<NowPlaying>,
    /// Artwork for the current descriptor; replaced on every track switch.
    artwork: Option<Receiver<MediaUrl>>,
    released: bool,
}

impl Session {
    pub fn new(
        engine: PlaybackEngine,
        resolver: Arc<dyn MediaResolver>,
        now_playing: Box<dyn NowPlayingSink>,
        snapshot: PlaybackHandle,
    ) -> Self {
        let session = Self {
            engine,
            queue: Queue::default(),
            policy: PlaybackPolicy::default(),
            resolver,
            now_playing,
            history: None,
            snapshot,
            rng: StdRng::from_os_rng(),
            skip_interval: Duration::from_secs(15),
            descriptor: None,
            artwork: None,
            released: false,
        };
        session.sync_snapshot(true);
        session
    }

    pub fn with_history(mut self, history: Arc<dyn PlayLog>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_policy(mut self, policy: PlaybackPolicy) -> Self {
        self.policy = policy;
        self.sync_snapshot(false);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_skip_interval(mut self, skip: Duration) -> Self {
        self.skip_interval = skip;
        self
    }

    pub fn policy(&self) -> PlaybackPolicy {
        self.policy
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    fn require_session(&self) -> Result<(), PlaybackError> {
        if self.queue.is_empty() {
            Err(PlaybackError::NoActiveSession)
        } else {
            Ok(())
        }
    }

    /// Apply one command from the outside world.
    pub fn handle(&mut self, cmd: AudioCmd) -> Result<(), PlaybackError> {
        match cmd {
            AudioCmd::SetQueue { tracks, start_at } => {
                self.set_queue(tracks, start_at);
                Ok(())
            }
            AudioCmd::Play => self.play(),
            AudioCmd::Pause => self.pause(),
            AudioCmd::TogglePause => self.toggle(),
            AudioCmd::Stop => self.stop(),
            AudioCmd::Seek(to) => self.seek(to),
            AudioCmd::SeekBy(ms) => self.seek_by(ms),
            AudioCmd::SkipForward => self.seek_by(self.skip_interval.as_millis() as i64),
            AudioCmd::SkipBackward => self.seek_by(-(self.skip_interval.as_millis() as i64)),
            AudioCmd::Next => self.next(),
            AudioCmd::Prev => self.previous(),
            AudioCmd::ToggleShuffle => {
                self.toggle_shuffle();
                Ok(())
            }
            AudioCmd::SetShuffle(on) => {
                self.set_shuffle(on);
                Ok(())
            }
            AudioCmd::CycleRepeat => {
                self.cycle_repeat_mode();
                Ok(())
            }
            AudioCmd::SetRepeatMode(mode) => {
                self.set_repeat_mode(mode);
                Ok(())
            }
            AudioCmd::Interruption(i) => self.interrupt(i),
            AudioCmd::Quit { fade_out_ms } => {
                self.shutdown(Duration::from_millis(fade_out_ms));
                Ok(())
            }
        }
    }

    /// Replace the queue and start playing at `start_at` (first track when out of range).
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_at: usize) {
        match self.queue.replace(tracks, start_at) {
            Some(index) => {
                info!(len = self.queue.len(), index, "queue replaced");
                self.switch_to(index);
            }
            None => {
                info!("queue cleared");
                self.artwork = None;
                self.descriptor = None;
                self.engine.unload();
                self.now_playing.clear();
                self.publish_capabilities();
            }
        }
        self.sync_snapshot(true);
    }

    /// Make `index` current: load it, publish it, play it.
    fn switch_to(&mut self, index: usize) {
        if !self.queue.select(index) {
            return;
        }
        let Some(track) = self.queue.current().cloned() else {
            return;
        };
        debug!(index, track = %track.label(), "switching track");

        // Superseded artwork must never land on the new descriptor.
        self.artwork = None;

        let resolved = self.resolver.resolve(&track.audio);
        match &resolved {
            Ok(url) => {
                // Failure is recorded as the engine fault; nothing else to do here.
                let _ = self.engine.load(url);
            }
            Err(e) => {
                warn!(track = %track.label(), error = %e, "track is unplayable");
                self.engine.unload();
                self.engine.set_fault(e.to_string());
            }
        }

        let mut descriptor = NowPlaying::for_track(index, &track);
        descriptor.duration = self.engine.duration().or_else(|| parse_clock(&track.duration));
        descriptor.url = resolved.as_ref().ok().map(MediaUrl::as_uri);
        self.now_playing.publish_track(&descriptor);
        self.descriptor = Some(descriptor);
        self.spawn_artwork(&track);

        self.engine.play();
        self.record_play(&track);

        self.publish_capabilities();
        self.publish_progress();
        self.sync_snapshot(false);
    }

    fn spawn_artwork(&mut self, track: &Track) {
        let Some(cover) = track.cover_art.clone().filter(|c| !c.trim().is_empty()) else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        self.artwork = Some(rx);

        let resolver = Arc::clone(&self.resolver);
        let label = track.label();
        thread::spawn(move || match resolver.resolve(&cover) {
            Ok(url) => {
                let _ = tx.send(url);
            }
            Err(e) => debug!(track = %label, error = %e, "no artwork"),
        });
    }

    fn record_play(&self, track: &Track) {
        if let Some(history) = &self.history {
            if let Err(e) = history.record(track) {
                warn!(track = %track.label(), error = %e, "failed to record play");
            }
        }
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        self.require_session()?;
        self.engine.play();
        self.publish_progress();
        self.sync_snapshot(false);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.require_session()?;
        self.engine.pause();
        self.publish_progress();
        self.sync_snapshot(false);
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<(), PlaybackError> {
        if self.engine.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Pause and rewind the current track.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        self.require_session()?;
        self.engine.pause();
        self.seek_to(Duration::ZERO, false);
        Ok(())
    }

    /// Seek within the current track, clamped to its known length.
    pub fn seek(&mut self, to: Duration) -> Result<(), PlaybackError> {
        self.require_session()?;
        let to = match self.engine.duration() {
            Some(d) => to.min(d),
            None => to,
        };
        self.seek_to(to, true);
        Ok(())
    }

    /// Seek relative to the current position (milliseconds).
    pub fn seek_by(&mut self, delta_ms: i64) -> Result<(), PlaybackError> {
        let current = self.engine.position().as_millis() as i64;
        let target = current.saturating_add(delta_ms).max(0) as u64;
        self.seek(Duration::from_millis(target))
    }

    fn seek_to(&mut self, to: Duration, keep_playing: bool) {
        let was_playing = self.engine.is_playing();
        match self.engine.seek(to) {
            Ok(pos) => {
                // Reopening a finished source leaves it paused.
                if keep_playing && was_playing && !self.engine.is_playing() {
                    self.engine.play();
                }
                self.now_playing.seeked(pos);
            }
            Err(e) => warn!(error = %e, "seek failed"),
        }
        self.publish_progress();
        self.sync_snapshot(false);
    }

    pub fn next(&mut self) -> Result<(), PlaybackError> {
        self.require_session()?;
        let step = self.queue.next_step(self.policy, &mut self.rng);
        self.apply(step);
        Ok(())
    }

    pub fn previous(&mut self) -> Result<(), PlaybackError> {
        self.require_session()?;
        let step = self.queue.previous_step(self.policy, &mut self.rng);
        self.apply(step);
        Ok(())
    }

    fn on_end_of_media(&mut self) {
        let step = self.queue.end_of_media_step(self.policy, &mut self.rng);
        debug!(?step, "end of media");
        self.apply(step);
    }

    fn apply(&mut self, step: Step) {
        match step {
            Step::Switch(index) => self.switch_to(index),
            Step::Restart => self.seek_to(Duration::ZERO, true),
            Step::Replay => {
                self.seek_to(Duration::ZERO, false);
                self.engine.play();
                self.publish_progress();
                self.sync_snapshot(false);
            }
            Step::Pause => {
                self.engine.pause();
                self.publish_progress();
                self.sync_snapshot(false);
            }
            Step::Finish => {
                self.engine.pause();
                self.seek_to(Duration::ZERO, false);
            }
            Step::Stay => {}
        }
    }

    pub fn toggle_shuffle(&mut self) {
        self.set_shuffle(!self.policy.shuffle);
    }

    pub fn set_shuffle(&mut self, on: bool) {
        self.policy.shuffle = on;
        self.publish_capabilities();
        self.sync_snapshot(false);
    }

    pub fn cycle_repeat_mode(&mut self) {
        self.set_repeat_mode(self.policy.repeat.cycled());
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.policy.repeat = mode;
        self.publish_capabilities();
        self.sync_snapshot(false);
    }

    pub fn interrupt(&mut self, interruption: Interruption) -> Result<(), PlaybackError> {
        match interruption {
            Interruption::Began => self.pause(),
            Interruption::Ended { should_resume: true } => self.play(),
            Interruption::Ended {
                should_resume: false,
            } => Ok(()),
        }
    }

    /// Apply pending engine and artwork events.
    pub fn pump(&mut self) {
        while let Some(event) = self.engine.poll_event() {
            match event {
                EngineEvent::Tick => self.on_tick(),
                EngineEvent::Ended => {
                    self.on_end_of_media();
                    // The source may have changed; its events come on the next pump.
                    break;
                }
            }
        }
        self.pump_artwork();
    }

    fn on_tick(&mut self) {
        let duration = self.engine.duration();
        if let Some(descriptor) = self.descriptor.as_mut() {
            if duration.is_some() && descriptor.duration != duration {
                descriptor.duration = duration;
                self.now_playing.publish_track(descriptor);
            }
        }
        self.publish_progress();
        self.sync_snapshot(false);
    }

    fn pump_artwork(&mut self) {
        let Some(rx) = self.artwork.as_ref() else {
            return;
        };
        match rx.try_recv() {
            Ok(url) => {
                let art = url.as_uri();
                if let Some(descriptor) = self.descriptor.as_mut() {
                    descriptor.art_url = Some(art.clone());
                }
                self.now_playing.merge_artwork(&art);
                self.artwork = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.artwork = None,
        }
    }

    fn transport(&self) -> Transport {
        if self.queue.is_empty() {
            Transport::Stopped
        } else if self.engine.is_playing() {
            Transport::Playing
        } else {
            Transport::Paused
        }
    }

    fn publish_progress(&mut self) {
        let playing = self.engine.is_playing();
        self.now_playing.publish_progress(Progress {
            transport: self.transport(),
            elapsed: self.engine.position(),
            rate: if playing { 1.0 } else { 0.0 },
        });
    }

    fn publish_capabilities(&mut self) {
        self.now_playing.publish_capabilities(Capabilities {
            policy: self.policy,
            can_go_next: self.queue.can_go_next(self.policy),
            can_go_previous: self.queue.can_go_previous(self.policy),
        });
    }

    fn sync_snapshot(&self, queue_changed: bool) {
        let Ok(mut snap) = self.snapshot.lock() else {
            return;
        };
        if queue_changed {
            snap.queue = self.queue.tracks().to_vec();
        }
        snap.is_playing = self.engine.is_playing();
        snap.current_time = self.engine.position();
        snap.duration = self.engine.duration();
        snap.current_index = self.queue.index();
        snap.current_track = self.queue.current().cloned();
        snap.policy = self.policy;
        snap.can_go_next = self.queue.can_go_next(self.policy);
        snap.can_go_previous = self.queue.can_go_previous(self.policy);
        snap.fault = self.engine.fault().map(str::to_string);
    }

    /// Fade out, drop the source and give up the media-control surface.
    pub fn shutdown(&mut self, fade_out: Duration) {
        self.engine.fade_out(fade_out);
        self.artwork = None;
        self.sync_snapshot(false);
        self.release();
    }

    /// Give up the media-control surface. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.now_playing.clear();
        self.now_playing.release();
        info!("playback session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
        self.engine.unload();
    }
}
