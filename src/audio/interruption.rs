//! OS audio interruptions (incoming calls, another app grabbing the device).

use std::str::FromStr;
use std::sync::mpsc::Sender;

use tracing::debug;

use crate::error::PlaybackError;

use super::types::AudioCmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Began,
    /// `should_resume` is the host's hint that playback may continue.
    Ended { should_resume: bool },
}

impl FromStr for Interruption {
    type Err = String;

    /// `began`, `ended` or `ended:resume`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "began" | "begin" => Ok(Self::Began),
            "ended" | "end" => Ok(Self::Ended {
                should_resume: false,
            }),
            "ended:resume" | "resume" => Ok(Self::Ended {
                should_resume: true,
            }),
            other => Err(format!("unknown interruption {other:?}")),
        }
    }
}

/// Forwards interruption notifications to the audio thread.
///
/// Holds no state of its own: an `Ended` without a preceding `Began` is
/// handled the same as any other.
#[derive(Debug, Clone)]
pub struct InterruptionHandler {
    tx: Sender<AudioCmd>,
}

impl InterruptionHandler {
    pub fn new(tx: Sender<AudioCmd>) -> Self {
        Self { tx }
    }

    pub fn notify(&self, interruption: Interruption) -> Result<(), PlaybackError> {
        debug!(?interruption, "audio interruption");
        self.tx
            .send(AudioCmd::Interruption(interruption))
            .map_err(|_| PlaybackError::Disconnected)
    }
}
