mod engine;
mod interruption;
mod now_playing;
mod output;
mod player;
mod queue;
mod session;
mod sink;
mod thread;
mod types;

pub use engine::{EngineEvent, PlaybackEngine};
pub use interruption::{Interruption, InterruptionHandler};
pub use now_playing::{Capabilities, Detached, NowPlaying, NowPlayingSink, Progress, Transport};
pub use output::{
    AudioFocus, AudioOutput, LoadedSource, NullOutput, SharedFocus, SourceEvent, spawn_watcher,
};
pub use player::AudioPlayer;
pub use queue::{Queue, Step};
pub use session::Session;
pub use sink::RodioOutput;
pub use thread::{OutputFactory, SessionConfig, SessionDeps};
pub use types::{AudioCmd, PlaybackHandle, PlaybackPolicy, PlayerSnapshot, RepeatMode};

#[cfg(test)]
mod tests;
