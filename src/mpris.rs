//! MPRIS bridge: the desktop media-control surface.
//!
//! The session publishes into an [`MprisHandle`]; a D-Bus thread serves the
//! `org.mpris.MediaPlayer2` objects from the shared state and forwards remote
//! commands back over a channel.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_io::{Timer, block_on};
use tracing::{debug, info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{Connection, fdo, interface};
use zvariant::{ObjectPath, OwnedValue, Value};

use crate::audio::{
    Capabilities, NowPlaying, NowPlayingSink, PlaybackPolicy, Progress, RepeatMode, Transport,
};

const PATH: &str = "/org/mpris/MediaPlayer2";
const NO_TRACK: &str = "/org/mpris/MediaPlayer2/TrackList/NoTrack";
const POLL: Duration = Duration::from_millis(50);

/// Commands arriving from media keys, desktop widgets or `playerctl`.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteCommand {
    Quit,
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    /// Relative seek in microseconds.
    SeekBy(i64),
    SetPosition(Duration),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
}

#[derive(Debug, Default)]
struct SharedState {
    transport: Transport,
    descriptor: Option<NowPlaying>,
    elapsed: Duration,
    /// When `elapsed` was last reported; position extrapolates from here while playing.
    stamped: Option<Instant>,
    rate: f64,
    caps: Capabilities,
    released: bool,
}

impl SharedState {
    fn position(&self) -> Duration {
        match (self.transport, self.stamped) {
            (Transport::Playing, Some(at)) => {
                let pos = self.elapsed + at.elapsed().mul_f64(self.rate);
                match self.descriptor.as_ref().and_then(|d| d.duration) {
                    Some(len) => pos.min(len),
                    None => pos,
                }
            }
            _ => self.elapsed,
        }
    }

    fn has_session(&self) -> bool {
        !self.released && self.descriptor.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Notify {
    Metadata,
    Playback,
    Capabilities,
    Seeked(i64),
    Release,
}

/// Owned by the session; dropping the session releases it.
pub struct MprisHandle {
    state: Arc<Mutex<SharedState>>,
    notify: Sender<Notify>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MprisHandle {
    fn update(&self, note: Notify, f: impl FnOnce(&mut SharedState)) {
        if let Ok(mut s) = self.state.lock() {
            f(&mut s);
        }
        let _ = self.notify.send(note);
    }
}

fn micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

fn track_path(queue_index: usize) -> String {
    format!("/org/mpris/MediaPlayer2/track/{queue_index}")
}

impl NowPlayingSink for MprisHandle {
    fn publish_track(&mut self, descriptor: &NowPlaying) {
        self.update(Notify::Metadata, |s| {
            s.descriptor = Some(descriptor.clone());
            s.elapsed = Duration::ZERO;
            s.stamped = Some(Instant::now());
        });
    }

    fn merge_artwork(&mut self, art_url: &str) {
        self.update(Notify::Metadata, |s| {
            if let Some(d) = s.descriptor.as_mut() {
                d.art_url = Some(art_url.to_string());
            }
        });
    }

    fn publish_progress(&mut self, progress: Progress) {
        let changed = self
            .state
            .lock()
            .map(|mut s| {
                let changed = s.transport != progress.transport;
                s.transport = progress.transport;
                s.elapsed = progress.elapsed;
                s.stamped = Some(Instant::now());
                s.rate = progress.rate;
                changed
            })
            .unwrap_or(false);
        // Position itself is never signalled; clients extrapolate it.
        if changed {
            let _ = self.notify.send(Notify::Playback);
        }
    }

    fn publish_capabilities(&mut self, caps: Capabilities) {
        self.update(Notify::Capabilities, |s| s.caps = caps);
    }

    fn seeked(&mut self, position: Duration) {
        self.update(Notify::Seeked(micros(position)), |s| {
            s.elapsed = position;
            s.stamped = Some(Instant::now());
        });
    }

    fn clear(&mut self) {
        self.update(Notify::Metadata, |s| {
            s.descriptor = None;
            s.transport = Transport::Stopped;
            s.elapsed = Duration::ZERO;
            s.rate = 0.0;
        });
        let _ = self.notify.send(Notify::Playback);
    }

    fn release(&mut self) {
        self.update(Notify::Release, |s| s.released = true);
        if let Ok(mut j) = self.join.lock() {
            if let Some(h) = j.take() {
                let _ = h.join();
            }
        }
    }
}

struct RootIface {
    tx: Sender<RemoteCommand>,
    identity: String,
}

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootIface {
    fn raise(&self) {
        // Headless.
    }

    fn quit(&self) -> fdo::Result<()> {
        self.tx
            .send(RemoteCommand::Quit)
            .map_err(|_| fdo::Error::Failed("player is gone".into()))
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> &str {
        &self.identity
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        vec!["file".into(), "http".into(), "https".into()]
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        vec![]
    }
}

struct PlayerIface {
    tx: Sender<RemoteCommand>,
    state: Arc<Mutex<SharedState>>,
}

impl PlayerIface {
    fn read<T>(&self, f: impl FnOnce(&SharedState) -> T, fallback: T) -> T {
        self.state.lock().map(|s| f(&s)).unwrap_or(fallback)
    }

    /// Route `cmd` to the session, or fail the D-Bus call when there is none.
    fn forward(&self, cmd: RemoteCommand) -> fdo::Result<()> {
        if !self.read(SharedState::has_session, false) {
            return Err(fdo::Error::Failed("no active playback session".into()));
        }
        self.tx
            .send(cmd)
            .map_err(|_| fdo::Error::Failed("player is gone".into()))
    }

    fn policy(&self) -> PlaybackPolicy {
        self.read(|s| s.caps.policy, PlaybackPolicy::default())
    }
}

fn loop_status(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::Off => "None",
        RepeatMode::All => "Playlist",
        RepeatMode::One => "Track",
    }
}

fn parse_loop_status(s: &str) -> Option<RepeatMode> {
    match s {
        "None" => Some(RepeatMode::Off),
        "Playlist" => Some(RepeatMode::All),
        "Track" => Some(RepeatMode::One),
        _ => None,
    }
}

fn owned(value: Value<'_>) -> Option<OwnedValue> {
    OwnedValue::try_from(value).ok()
}

fn metadata_for(descriptor: Option<&NowPlaying>) -> HashMap<String, OwnedValue> {
    let mut map = HashMap::new();
    let Some(d) = descriptor else {
        if let Some(v) = ObjectPath::try_from(NO_TRACK).ok().and_then(|p| owned(Value::from(p))) {
            map.insert("mpris:trackid".to_string(), v);
        }
        return map;
    };

    let path = track_path(d.queue_index);
    let mut put = |key: &str, value: Option<OwnedValue>| {
        if let Some(v) = value {
            map.insert(key.to_string(), v);
        }
    };
    put(
        "mpris:trackid",
        ObjectPath::try_from(path.as_str())
            .ok()
            .and_then(|p| owned(Value::from(p))),
    );
    put("xesam:title", owned(Value::from(d.title.as_str())));
    put("xesam:artist", owned(Value::from(vec![d.artist.clone()])));
    if let Some(album) = &d.album {
        put("xesam:album", owned(Value::from(album.as_str())));
    }
    if let Some(len) = d.duration {
        put("mpris:length", owned(Value::from(micros(len))));
    }
    if let Some(url) = &d.url {
        put("xesam:url", owned(Value::from(url.as_str())));
    }
    if let Some(art) = &d.art_url {
        put("mpris:artUrl", owned(Value::from(art.as_str())));
    }
    map
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerIface {
    fn next(&self) -> fdo::Result<()> {
        self.forward(RemoteCommand::Next)
    }

    fn previous(&self) -> fdo::Result<()> {
        self.forward(RemoteCommand::Previous)
    }

    fn play(&self) -> fdo::Result<()> {
        self.forward(RemoteCommand::Play)
    }

    fn pause(&self) -> fdo::Result<()> {
        self.forward(RemoteCommand::Pause)
    }

    fn play_pause(&self) -> fdo::Result<()> {
        self.forward(RemoteCommand::PlayPause)
    }

    fn stop(&self) -> fdo::Result<()> {
        self.forward(RemoteCommand::Stop)
    }

    fn seek(&self, offset: i64) -> fdo::Result<()> {
        self.forward(RemoteCommand::SeekBy(offset))
    }

    fn set_position(&self, track_id: ObjectPath<'_>, position: i64) -> fdo::Result<()> {
        let current = self.read(
            |s| s.descriptor.as_ref().map(|d| track_path(d.queue_index)),
            None,
        );
        // Stale requests for another track are ignored.
        if current.as_deref() != Some(track_id.as_str()) || position < 0 {
            debug!(track = %track_id, position, "ignoring SetPosition");
            return Ok(());
        }
        self.forward(RemoteCommand::SetPosition(Duration::from_micros(
            position as u64,
        )))
    }

    fn open_uri(&self, _uri: &str) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("OpenUri is not supported".into()))
    }

    #[zbus(signal)]
    async fn seeked(emitter: &SignalEmitter<'_>, position: i64) -> zbus::Result<()>;

    #[zbus(property)]
    fn playback_status(&self) -> &str {
        match self.read(|s| s.transport, Transport::Stopped) {
            Transport::Stopped => "Stopped",
            Transport::Playing => "Playing",
            Transport::Paused => "Paused",
        }
    }

    #[zbus(property)]
    fn loop_status(&self) -> &str {
        loop_status(self.policy().repeat)
    }

    #[zbus(property)]
    fn set_loop_status(&mut self, value: String) -> fdo::Result<()> {
        let Some(mode) = parse_loop_status(&value) else {
            warn!(value = %value, "unknown LoopStatus");
            return Err(fdo::Error::InvalidArgs(format!("unknown LoopStatus {value:?}")));
        };
        self.forward(RemoteCommand::SetRepeat(mode))
    }

    #[zbus(property)]
    fn shuffle(&self) -> bool {
        self.policy().shuffle
    }

    #[zbus(property)]
    fn set_shuffle(&mut self, value: bool) -> fdo::Result<()> {
        self.forward(RemoteCommand::SetShuffle(value))
    }

    #[zbus(property)]
    fn rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn minimum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn maximum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn volume(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn metadata(&self) -> HashMap<String, OwnedValue> {
        self.state
            .lock()
            .map(|s| metadata_for(s.descriptor.as_ref()))
            .unwrap_or_default()
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn position(&self) -> i64 {
        micros(self.read(SharedState::position, Duration::ZERO))
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        self.read(|s| s.has_session() && s.caps.can_go_next, false)
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        self.read(|s| s.has_session() && s.caps.can_go_previous, false)
    }

    #[zbus(property)]
    fn can_play(&self) -> bool {
        self.read(SharedState::has_session, false)
    }

    #[zbus(property)]
    fn can_pause(&self) -> bool {
        self.read(SharedState::has_session, false)
    }

    #[zbus(property)]
    fn can_seek(&self) -> bool {
        self.read(SharedState::has_session, false)
    }

    #[zbus(property)]
    fn can_control(&self) -> bool {
        true
    }
}

/// The bus name plus both registered objects, released as one unit.
struct Registrations {
    connection: Connection,
    name: String,
}

impl Registrations {
    async fn register(
        name: String,
        root: RootIface,
        player: PlayerIface,
    ) -> zbus::Result<Self> {
        let connection = Connection::session().await?;
        let server = connection.object_server();
        server.at(PATH, root).await?;
        server.at(PATH, player).await?;
        connection.request_name(name.as_str()).await?;
        Ok(Self { connection, name })
    }

    async fn release(self) {
        let server = self.connection.object_server();
        if let Err(e) = server.remove::<PlayerIface, _>(PATH).await {
            warn!(error = %e, "failed to unregister MPRIS player");
        }
        if let Err(e) = server.remove::<RootIface, _>(PATH).await {
            warn!(error = %e, "failed to unregister MPRIS root");
        }
        if let Err(e) = self.connection.release_name(self.name.as_str()).await {
            warn!(error = %e, "failed to release MPRIS bus name");
        }
        info!(name = %self.name, "MPRIS released");
    }
}

async fn emit(connection: &Connection, note: Notify) -> zbus::Result<()> {
    let iface = connection
        .object_server()
        .interface::<_, PlayerIface>(PATH)
        .await?;
    let emitter = iface.signal_emitter();
    let player = iface.get().await;
    match note {
        Notify::Metadata => {
            player.metadata_changed(emitter).await?;
            player.can_play_changed(emitter).await?;
            player.can_pause_changed(emitter).await?;
            player.can_seek_changed(emitter).await?;
        }
        Notify::Playback => player.playback_status_changed(emitter).await?,
        Notify::Capabilities => {
            player.can_go_next_changed(emitter).await?;
            player.can_go_previous_changed(emitter).await?;
            player.shuffle_changed(emitter).await?;
            player.loop_status_changed(emitter).await?;
        }
        Notify::Seeked(position) => PlayerIface::seeked(emitter, position).await?,
        Notify::Release => {}
    }
    Ok(())
}

async fn serve(
    bus_name: String,
    root: RootIface,
    player: PlayerIface,
    notify_rx: Receiver<Notify>,
) {
    let name = format!("org.mpris.MediaPlayer2.{bus_name}");
    let registrations = match Registrations::register(name.clone(), root, player).await {
        Ok(r) => r,
        Err(e) => {
            warn!(name = %name, error = %e, "MPRIS unavailable");
            return;
        }
    };
    info!(name = %name, "MPRIS registered");

    loop {
        loop {
            match notify_rx.try_recv() {
                Ok(Notify::Release) | Err(TryRecvError::Disconnected) => {
                    registrations.release().await;
                    return;
                }
                Ok(note) => {
                    if let Err(e) = emit(&registrations.connection, note).await {
                        debug!(?note, error = %e, "MPRIS signal not sent");
                    }
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        Timer::after(POLL).await;
    }
}

/// Register on the session bus and start serving. Commands go to `tx`.
///
/// Failing to reach the bus is logged; the returned handle still works as a sink.
pub fn spawn_mpris(tx: Sender<RemoteCommand>, bus_name: &str) -> MprisHandle {
    let state = Arc::new(Mutex::new(SharedState::default()));
    let (notify_tx, notify_rx) = mpsc::channel();

    let root = RootIface {
        tx: tx.clone(),
        identity: bus_name.to_string(),
    };
    let player = PlayerIface {
        tx,
        state: state.clone(),
    };
    let bus_name = bus_name.to_string();
    let join = thread::spawn(move || block_on(serve(bus_name, root, player, notify_rx)));

    MprisHandle {
        state,
        notify: notify_tx,
        join: Mutex::new(Some(join)),
    }
}
