use std::env;
use std::sync::{Arc, mpsc};

use tracing::info;

use crate::audio::{
    AudioOutput, AudioPlayer, Detached, NowPlayingSink, RodioOutput, SessionDeps, SharedFocus,
};
use crate::logging::init_logging;
use crate::mpris::{RemoteCommand, spawn_mpris};
use crate::resolver::{MediaResolver, StorageResolver};
use crate::store::{Library, PlayLog};

mod event_loop;
mod settings;
mod startup;

pub use event_loop::{Command, EventLoopState, parse_command, remote_to_audio, status_line};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings::load_settings();
    init_logging(&settings.logging)?;

    let catalog = startup::load_catalog(env::args().nth(1), &settings)?;

    let resolver: Arc<dyn MediaResolver> = Arc::new(StorageResolver::from_settings(
        settings.storage.base_url.as_deref(),
        settings.storage.media_root.as_deref(),
    ));
    let mut state = EventLoopState::new(Box::new(catalog), Arc::clone(&resolver))?;
    let library = Library::open(
        &settings.data_dir(),
        &settings.downloads_dir(),
        settings.library.history_capacity,
        Arc::clone(&resolver),
    )?;

    let (remote_tx, remote_rx) = mpsc::channel::<RemoteCommand>();
    let now_playing: Box<dyn NowPlayingSink> = if settings.remote.enabled {
        Box::new(spawn_mpris(remote_tx, &settings.remote.bus_name))
    } else {
        Box::new(Detached)
    };

    let history: Arc<dyn PlayLog> = library.history.clone();
    let deps = SessionDeps {
        output: Box::new(|| {
            RodioOutput::open_default().map(|o| Box::new(o) as Box<dyn AudioOutput>)
        }),
        focus: Box::new(SharedFocus),
        resolver,
        now_playing,
        history: Some(history),
    };
    let audio_player = AudioPlayer::new(deps, startup::session_config(&settings));
    info!(tracks = state.track_count(), "ready");
    println!("cadenza: {} tracks, type `help` for commands", state.track_count());

    let lines = event_loop::spawn_stdin_reader();
    event_loop::run(
        &settings,
        &audio_player,
        &library,
        &remote_rx,
        &lines,
        &mut state,
    )
}
