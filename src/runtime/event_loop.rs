use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audio::{AudioCmd, AudioPlayer, Interruption, PlayerSnapshot, RepeatMode};
use crate::config;
use crate::error::CatalogError;
use crate::library::{
    Track, TrackCatalog, format_clock, format_clock_opt, parse_clock, search_locally,
};
use crate::mpris::RemoteCommand;
use crate::resolver::MediaResolver;
use crate::store::{DownloadsStore, Library};

const POLL: Duration = Duration::from_millis(50);

const HELP: &str = "\
commands:
  search <text>        list matching tracks        list       show the current listing
  play [n]             play listing entry n        pause | toggle | stop
  play playlist <name> queue a playlist            playlists | artists
  next | prev          skip tracks                 seek <s|mm:ss>, ff, rew
  shuffle | repeat     change the policy           status
  fav | unfav          (un)favorite current track  favs       list favorites
  history              list recent plays           dl         download current track
  downloads            list downloads              interrupt began|ended[:resume]
  quit";

/// One line typed on stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 1-based entry of the current listing; `None` resumes or starts the listing.
    Play(Option<usize>),
    PlayPlaylist(String),
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    Seek(Duration),
    Forward,
    Rewind,
    Shuffle,
    Repeat,
    Search(String),
    List,
    Playlists,
    Artists,
    Status,
    Favorite,
    Unfavorite,
    Favorites,
    History,
    Download,
    Downloads,
    Interrupt(Interruption),
    Help,
    Quit,
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" | "p" if rest.is_empty() => Command::Play(None),
        "play" | "p" => match rest.split_once(char::is_whitespace) {
            Some(("playlist", name)) => Command::PlayPlaylist(name.trim().to_string()),
            _ => match rest.parse::<usize>() {
                Ok(n) if n > 0 => Command::Play(Some(n)),
                _ => return Err(format!("not a listing entry: {rest}")),
            },
        },
        "pause" => Command::Pause,
        "toggle" | "t" => Command::Toggle,
        "stop" => Command::Stop,
        "next" | "n" => Command::Next,
        "prev" | "previous" => Command::Prev,
        "seek" => match parse_clock(rest) {
            Some(to) => Command::Seek(to),
            None => return Err(format!("not a position: {rest:?}")),
        },
        "ff" => Command::Forward,
        "rew" => Command::Rewind,
        "shuffle" => Command::Shuffle,
        "repeat" => Command::Repeat,
        "search" | "s" | "/" => Command::Search(rest.to_string()),
        "list" | "ls" => Command::List,
        "playlists" => Command::Playlists,
        "artists" => Command::Artists,
        "status" => Command::Status,
        "fav" => Command::Favorite,
        "unfav" => Command::Unfavorite,
        "favs" | "favorites" => Command::Favorites,
        "history" => Command::History,
        "dl" | "download" => Command::Download,
        "downloads" => Command::Downloads,
        "interrupt" => Command::Interrupt(rest.parse()?),
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(Some(cmd))
}

/// Translate a media-control request into an audio command. `None` means quit.
pub fn remote_to_audio(cmd: RemoteCommand) -> Option<AudioCmd> {
    Some(match cmd {
        RemoteCommand::Quit => return None,
        RemoteCommand::Play => AudioCmd::Play,
        RemoteCommand::Pause => AudioCmd::Pause,
        RemoteCommand::PlayPause => AudioCmd::TogglePause,
        RemoteCommand::Stop => AudioCmd::Stop,
        RemoteCommand::Next => AudioCmd::Next,
        RemoteCommand::Previous => AudioCmd::Prev,
        RemoteCommand::SeekBy(micros) => AudioCmd::SeekBy(micros / 1000),
        RemoteCommand::SetPosition(to) => AudioCmd::Seek(to),
        RemoteCommand::SetShuffle(on) => AudioCmd::SetShuffle(on),
        RemoteCommand::SetRepeat(mode) => AudioCmd::SetRepeatMode(mode),
    })
}

/// Swap in the local copy of every downloaded track.
pub fn prefer_downloaded(tracks: &[Track], downloads: &DownloadsStore) -> Vec<Track> {
    tracks
        .iter()
        .map(|t| {
            let local = t.id.as_deref().and_then(|id| downloads.local_path_for(id));
            match local {
                Some(path) => Track {
                    audio: path.display().to_string(),
                    ..t.clone()
                },
                None => t.clone(),
            }
        })
        .collect()
}

pub fn status_line(snap: &PlayerSnapshot) -> String {
    let Some(track) = &snap.current_track else {
        return "nothing queued".to_string();
    };
    let state = if snap.is_playing { "playing" } else { "paused" };
    let mut line = format!(
        "{state}: {} [{} / {}]",
        track.label(),
        format_clock(snap.current_time),
        format_clock_opt(snap.duration)
    );
    if snap.policy.shuffle {
        line.push_str(" shuffle");
    }
    match snap.policy.repeat {
        RepeatMode::Off => {}
        RepeatMode::All => line.push_str(" repeat:all"),
        RepeatMode::One => line.push_str(" repeat:one"),
    }
    if let Some(fault) = &snap.fault {
        line.push_str(&format!(" (error: {fault})"));
    }
    line
}

/// Forward stdin lines to the event loop until EOF.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx): (Sender<String>, Receiver<String>) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// State tracked by the runtime event loop across iterations.
pub struct EventLoopState {
    catalog: Box<dyn TrackCatalog>,
    resolver: Arc<dyn MediaResolver>,
    /// Everything the catalog returned.
    corpus: Vec<Track>,
    /// What `play n` indexes into: the last search or library listing.
    listing: Vec<Track>,
}

impl EventLoopState {
    pub fn new(
        catalog: Box<dyn TrackCatalog>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Result<Self, CatalogError> {
        let corpus = catalog.all_tracks()?;
        Ok(Self {
            catalog,
            resolver,
            listing: corpus.clone(),
            corpus,
        })
    }

    pub fn track_count(&self) -> usize {
        self.corpus.len()
    }

    /// The tracks of playlist `name`, resolved and in playlist order.
    pub fn playlist_tracks(&self, name: &str) -> Result<Vec<Track>, String> {
        let playlist = self
            .catalog
            .playlist(name)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no playlist named {name:?}"))?;
        let tracks = self
            .catalog
            .tracks_for(&playlist, self.resolver.as_ref())
            .map_err(|e| e.to_string())?;
        if tracks.is_empty() {
            return Err(format!("playlist {name:?} has no known tracks"));
        }
        Ok(tracks)
    }
}

fn print_listing(tracks: &[Track]) {
    if tracks.is_empty() {
        println!("(no tracks)");
    }
    for (i, t) in tracks.iter().enumerate() {
        println!("{:>4}  {}", i + 1, t.label());
    }
}

/// Main loop: media-control requests and stdin commands. Returns when quitting.
pub fn run(
    settings: &config::Settings,
    player: &AudioPlayer,
    library: &Library,
    remote_rx: &Receiver<RemoteCommand>,
    lines: &Receiver<String>,
    state: &mut EventLoopState,
) -> Result<(), Box<dyn std::error::Error>> {
    let fade = Duration::from_millis(settings.audio.quit_fade_out_ms);
    loop {
        while let Ok(cmd) = remote_rx.try_recv() {
            debug!(?cmd, "remote command");
            match remote_to_audio(cmd) {
                Some(audio) => {
                    if let Err(e) = player.send(audio) {
                        warn!(error = %e, "remote command dropped");
                    }
                }
                None => {
                    info!("quit requested over MPRIS");
                    player.quit_softly(fade);
                    return Ok(());
                }
            }
        }

        match lines.recv_timeout(POLL) {
            Ok(line) => match parse_command(&line) {
                Ok(Some(Command::Quit)) => {
                    player.quit_softly(fade);
                    return Ok(());
                }
                Ok(Some(cmd)) => {
                    if let Err(msg) = execute(cmd, settings, player, library, state) {
                        println!("error: {msg}");
                    }
                }
                Ok(None) => {}
                Err(msg) => println!("{msg}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                player.quit_softly(fade);
                return Ok(());
            }
        }
    }
}

fn execute(
    cmd: Command,
    settings: &config::Settings,
    player: &AudioPlayer,
    library: &Library,
    state: &mut EventLoopState,
) -> Result<(), String> {
    let err = |e: &dyn std::fmt::Display| e.to_string();
    let current = || player.snapshot().current_track;

    match cmd {
        Command::Play(Some(n)) => {
            if n > state.listing.len() {
                return Err(format!("listing has {} entries", state.listing.len()));
            }
            let queue = prefer_downloaded(&state.listing, &library.downloads);
            player.set_queue(queue, n - 1).map_err(|e| err(&e))?;
        }
        Command::Play(None) => {
            if player.snapshot().queue.is_empty() {
                let queue = prefer_downloaded(&state.listing, &library.downloads);
                player.set_queue(queue, 0).map_err(|e| err(&e))?;
            } else {
                player.play().map_err(|e| err(&e))?;
            }
        }
        Command::PlayPlaylist(name) => {
            state.listing = state.playlist_tracks(&name)?;
            let queue = prefer_downloaded(&state.listing, &library.downloads);
            player.set_queue(queue, 0).map_err(|e| err(&e))?;
            info!(playlist = %name, tracks = state.listing.len(), "playlist queued");
        }
        Command::Pause => player.pause().map_err(|e| err(&e))?,
        Command::Toggle => player.toggle().map_err(|e| err(&e))?,
        Command::Stop => player.send(AudioCmd::Stop).map_err(|e| err(&e))?,
        Command::Next => player.next().map_err(|e| err(&e))?,
        Command::Prev => player.previous().map_err(|e| err(&e))?,
        Command::Seek(to) => player.seek(to).map_err(|e| err(&e))?,
        Command::Forward => player.send(AudioCmd::SkipForward).map_err(|e| err(&e))?,
        Command::Rewind => player.send(AudioCmd::SkipBackward).map_err(|e| err(&e))?,
        Command::Shuffle => player.toggle_shuffle().map_err(|e| err(&e))?,
        Command::Repeat => player.cycle_repeat_mode().map_err(|e| err(&e))?,
        Command::Search(query) => {
            state.listing = search_locally(&query, &state.corpus);
            print_listing(&state.listing);
        }
        Command::List => print_listing(&state.listing),
        Command::Playlists => {
            let playlists = state.catalog.playlists().map_err(|e| err(&e))?;
            if playlists.is_empty() {
                println!("(no playlists)");
            }
            for p in playlists {
                println!("  {} ({} tracks)", p.name, p.tracks_ids.len());
            }
        }
        Command::Artists => {
            let artists = state
                .catalog
                .artists_with_photos(0, state.resolver.as_ref())
                .map_err(|e| err(&e))?;
            for a in artists {
                println!("  {}  {}", a.name, a.info);
            }
        }
        Command::Status => println!("{}", status_line(&player.snapshot())),
        Command::Favorite => {
            let track = current().ok_or("nothing is playing")?;
            library.favorites.add(&track).map_err(|e| err(&e))?;
            println!("favorited {}", track.label());
        }
        Command::Unfavorite => {
            let track = current().ok_or("nothing is playing")?;
            let id = track.id.as_deref().ok_or("track has no id")?;
            if library.favorites.remove(id).map_err(|e| err(&e))? {
                println!("unfavorited {}", track.label());
            }
        }
        Command::Favorites => {
            state.listing = library.favorites.tracks();
            print_listing(&state.listing);
        }
        Command::History => {
            state.listing = library.history.recent(settings.library.history_limit);
            print_listing(&state.listing);
        }
        Command::Download => {
            let track = current().ok_or("nothing is playing")?;
            let entry = library.downloads.download(&track).map_err(|e| err(&e))?;
            println!("downloaded to {}", entry.local_path.display());
        }
        Command::Downloads => {
            let entries = library.downloads.entries().map_err(|e| err(&e))?;
            state.listing = entries.iter().map(|e| e.to_track()).collect();
            print_listing(&state.listing);
        }
        Command::Interrupt(i) => player
            .interruption_handler()
            .notify(i)
            .map_err(|e| err(&e))?,
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}
