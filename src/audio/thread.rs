use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::AudioError;
use crate::resolver::MediaResolver;
use crate::store::PlayLog;

use super::engine::PlaybackEngine;
use super::now_playing::NowPlayingSink;
use super::output::{AudioFocus, AudioOutput, NullOutput};
use super::session::Session;
use super::types::{AudioCmd, PlaybackHandle, PlaybackPolicy};

/// Opens the audio output. Runs on the audio thread: rodio streams are not `Send`.
pub type OutputFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioOutput>, AudioError> + Send>;

/// Collaborators the session is built from.
pub struct SessionDeps {
    pub output: OutputFactory,
    pub focus: Box<dyn AudioFocus>,
    pub resolver: Arc<dyn MediaResolver>,
    pub now_playing: Box<dyn NowPlayingSink>,
    pub history: Option<Arc<dyn PlayLog>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    /// How long the loop waits for a command before pumping engine events.
    pub poll_interval: Duration,
    pub skip_interval: Duration,
    pub policy: PlaybackPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            skip_interval: Duration::from_secs(15),
            policy: PlaybackPolicy::default(),
        }
    }
}

pub(super) fn spawn_audio_thread(
    deps: SessionDeps,
    config: SessionConfig,
    rx: Receiver<AudioCmd>,
    playback_info: PlaybackHandle,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let SessionDeps {
            output,
            focus,
            resolver,
            now_playing,
            history,
        } = deps;

        let output = output().unwrap_or_else(|e| {
            warn!(error = %e, "no audio output, tracks will not play");
            Box::new(NullOutput::new(e.to_string()))
        });

        let engine = PlaybackEngine::new(output, focus, config.tick_interval);
        let mut session = Session::new(engine, resolver, now_playing, playback_info)
            .with_policy(config.policy)
            .with_skip_interval(config.skip_interval);
        if let Some(history) = history {
            session = session.with_history(history);
        }
        info!("audio thread started");

        loop {
            match rx.recv_timeout(config.poll_interval) {
                Ok(AudioCmd::Quit { fade_out_ms }) => {
                    session.shutdown(Duration::from_millis(fade_out_ms));
                    break;
                }
                Ok(cmd) => {
                    if let Err(e) = session.handle(cmd) {
                        debug!(error = %e, "command ignored");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            session.pump();
        }
        info!("audio thread stopped");
    })
}
