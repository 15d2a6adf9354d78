use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{AudioError, PlaybackError, StoreError};
use crate::library::Track;
use crate::resolver::{MediaUrl, StorageResolver};
use crate::store::PlayLog;

use super::*;

const LENGTH: Duration = Duration::from_secs(180);

struct FakeSource {
    media: MediaUrl,
    duration: Option<Duration>,
    playing: AtomicBool,
    finished: AtomicBool,
    position: Mutex<Duration>,
    volume: Mutex<f32>,
    events: Mutex<Option<Sender<SourceEvent>>>,
}

impl FakeSource {
    fn emit(&self, event: SourceEvent) -> bool {
        self.events
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Play to the end, the way a real source would report it.
    fn finish(&self) -> bool {
        self.finished.store(true, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        self.emit(SourceEvent::Ended)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn file_name(&self) -> String {
        match &self.media {
            MediaUrl::Local(p) => p.file_name().unwrap().to_string_lossy().into_owned(),
            MediaUrl::Remote(u) => u.to_string(),
        }
    }
}

impl LoadedSource for FakeSource {
    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }
    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
    fn seek(&self, to: Duration) -> Result<(), AudioError> {
        *self.position.lock().unwrap() = to;
        Ok(())
    }
    fn position(&self) -> Duration {
        *self.position.lock().unwrap()
    }
    fn duration(&self) -> Option<Duration> {
        self.duration
    }
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap() = volume;
    }
}

type Opened = Arc<Mutex<Vec<Arc<FakeSource>>>>;

/// Opens every path except ones containing `broken`; `unknown` paths report no duration.
#[derive(Default)]
struct FakeOutput {
    opened: Opened,
}

impl AudioOutput for FakeOutput {
    fn open(&mut self, media: &MediaUrl) -> Result<Arc<dyn LoadedSource>, AudioError> {
        let name = media.to_string();
        if name.contains("broken") {
            return Err(AudioError::Decode(format!("cannot decode {name}")));
        }
        let source = Arc::new(FakeSource {
            media: media.clone(),
            duration: (!name.contains("unknown")).then_some(LENGTH),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            position: Mutex::new(Duration::ZERO),
            volume: Mutex::new(1.0),
            events: Mutex::new(None),
        });
        self.opened.lock().unwrap().push(Arc::clone(&source));
        Ok(source)
    }

    fn watch(&self, source: Arc<dyn LoadedSource>, _interval: Duration) -> Receiver<SourceEvent> {
        let (tx, rx) = mpsc::channel();
        drop(source);
        // The source being watched is always the one just opened.
        if let Some(last) = self.opened.lock().unwrap().last() {
            *last.events.lock().unwrap() = Some(tx);
        }
        rx
    }
}

#[derive(Clone, Default)]
struct CountingFocus {
    activations: Arc<AtomicUsize>,
    deactivations: Arc<AtomicUsize>,
    refuse: bool,
}

impl CountingFocus {
    /// Activations not yet matched by a deactivation.
    fn held(&self) -> usize {
        self.activations.load(Ordering::SeqCst) - self.deactivations.load(Ordering::SeqCst)
    }
}

impl AudioFocus for CountingFocus {
    fn activate(&mut self) -> Result<(), AudioError> {
        if self.refuse {
            return Err(AudioError::Focus("another app holds the device".into()));
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&mut self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SinkCall {
    Track(NowPlaying),
    Artwork(String),
    Progress(Progress),
    Caps(Capabilities),
    Seeked(Duration),
    Clear,
    Release,
}

#[derive(Clone, Default)]
struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl NowPlayingSink for RecordingSink {
    fn publish_track(&mut self, descriptor: &NowPlaying) {
        self.calls.lock().unwrap().push(SinkCall::Track(descriptor.clone()));
    }
    fn merge_artwork(&mut self, art_url: &str) {
        self.calls.lock().unwrap().push(SinkCall::Artwork(art_url.to_string()));
    }
    fn publish_progress(&mut self, progress: Progress) {
        self.calls.lock().unwrap().push(SinkCall::Progress(progress));
    }
    fn publish_capabilities(&mut self, caps: Capabilities) {
        self.calls.lock().unwrap().push(SinkCall::Caps(caps));
    }
    fn seeked(&mut self, position: Duration) {
        self.calls.lock().unwrap().push(SinkCall::Seeked(position));
    }
    fn clear(&mut self) {
        self.calls.lock().unwrap().push(SinkCall::Clear);
    }
    fn release(&mut self) {
        self.calls.lock().unwrap().push(SinkCall::Release);
    }
}

#[derive(Default)]
struct RecordingLog {
    plays: Mutex<Vec<String>>,
}

impl PlayLog for RecordingLog {
    fn record(&self, track: &Track) -> Result<(), StoreError> {
        self.plays.lock().unwrap().push(track.name.clone());
        Ok(())
    }
}

fn track(name: &str) -> Track {
    Track {
        id: Some(name.to_lowercase()),
        name: name.to_string(),
        performer: "Band".to_string(),
        album: Some("Record".to_string()),
        duration: "3:00".to_string(),
        audio: format!("/music/{}.mp3", name.to_lowercase()),
        cover_art: None,
    }
}

fn tracks(names: &[&str]) -> Vec<Track> {
    names.iter().map(|n| track(n)).collect()
}

struct Harness {
    session: Session,
    opened: Opened,
    calls: Arc<Mutex<Vec<SinkCall>>>,
    snapshot: PlaybackHandle,
    focus: CountingFocus,
    log: Arc<RecordingLog>,
}

impl Harness {
    fn new(policy: PlaybackPolicy) -> Self {
        Self::with_focus(policy, CountingFocus::default())
    }

    fn with_focus(policy: PlaybackPolicy, focus: CountingFocus) -> Self {
        let output = FakeOutput::default();
        let opened = Arc::clone(&output.opened);
        let sink = RecordingSink::default();
        let calls = Arc::clone(&sink.calls);
        let snapshot: PlaybackHandle = Arc::new(Mutex::new(PlayerSnapshot::default()));
        let log = Arc::new(RecordingLog::default());

        let engine = PlaybackEngine::new(
            Box::new(output),
            Box::new(focus.clone()),
            Duration::from_millis(10),
        );
        let session = Session::new(
            engine,
            Arc::new(StorageResolver::default()),
            Box::new(sink),
            Arc::clone(&snapshot),
        )
        .with_policy(policy)
        .with_rng(StdRng::seed_from_u64(7))
        .with_history(log.clone());

        Self {
            session,
            opened,
            calls,
            snapshot,
            focus,
            log,
        }
    }

    fn current(&self) -> Arc<FakeSource> {
        Arc::clone(self.opened.lock().unwrap().last().unwrap())
    }

    fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    fn snap(&self) -> PlayerSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    fn index(&self) -> Option<usize> {
        self.session.queue().index()
    }

    fn plays(&self) -> Vec<String> {
        self.log.plays.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    fn last_track_call(&self) -> Option<NowPlaying> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SinkCall::Track(t) => Some(t),
            _ => None,
        })
    }

    /// Let the current source reach its end and the session react to it.
    fn finish_current(&mut self) {
        assert!(self.current().finish());
        self.session.pump();
    }
}

fn policy(shuffle: bool, repeat: RepeatMode) -> PlaybackPolicy {
    PlaybackPolicy { shuffle, repeat }
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn set_queue_starts_at_requested_index_and_plays() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B", "C"]), 1);

    assert_eq!(h.index(), Some(1));
    assert!(h.session.engine().is_playing());
    assert!(h.current().is_playing());
    assert_eq!(h.current().file_name(), "b.mp3");

    let snap = h.snap();
    assert!(snap.is_playing);
    assert_eq!(snap.current_index, Some(1));
    assert_eq!(snap.queue.len(), 3);
    assert_eq!(snap.current_track.map(|t| t.name), Some("B".to_string()));
    assert_eq!(snap.duration, Some(LENGTH));
}

#[test]
fn set_queue_out_of_range_start_selects_first_track() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B"]), 9);
    assert_eq!(h.index(), Some(0));
    assert!(h.session.engine().is_playing());
}

#[test]
fn empty_queue_clears_session_and_rejects_transport_commands() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);
    h.session.set_queue(Vec::new(), 0);

    assert_eq!(h.index(), None);
    assert!(!h.session.engine().is_loaded());
    assert!(h.calls().contains(&SinkCall::Clear));
    assert_eq!(h.session.play(), Err(PlaybackError::NoActiveSession));
    assert_eq!(h.session.next(), Err(PlaybackError::NoActiveSession));

    let snap = h.snap();
    assert!(!snap.is_playing);
    assert!(snap.current_track.is_none());
    assert!(snap.queue.is_empty());
}

#[test]
fn play_and_pause_are_idempotent() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);
    h.session.play().unwrap();
    h.session.play().unwrap();
    assert_eq!(h.focus.activations.load(Ordering::SeqCst), 1);

    h.session.pause().unwrap();
    h.session.pause().unwrap();
    assert!(!h.session.engine().is_playing());
    assert!(!h.current().is_playing());

    h.session.toggle().unwrap();
    assert!(h.session.engine().is_playing());
}

#[test]
fn seek_moves_head_and_is_clamped_to_length() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);

    h.session.seek(Duration::from_secs(30)).unwrap();
    assert_eq!(h.session.engine().position(), Duration::from_secs(30));
    assert_eq!(h.current().position(), Duration::from_secs(30));
    assert!(h.calls().contains(&SinkCall::Seeked(Duration::from_secs(30))));
    assert!(h.session.engine().is_playing());

    h.session.seek(Duration::from_secs(999)).unwrap();
    assert_eq!(h.session.engine().position(), LENGTH);

    h.session.seek_by(-500_000).unwrap();
    assert_eq!(h.session.engine().position(), Duration::ZERO);
}

#[test]
fn single_track_with_shuffle_stays_put() {
    let mut h = Harness::new(policy(true, RepeatMode::Off));
    h.session.set_queue(tracks(&["A"]), 0);
    let before = h.opened_count();

    h.session.next().unwrap();
    h.session.previous().unwrap();

    assert_eq!(h.index(), Some(0));
    assert_eq!(h.opened_count(), before);
    assert!(h.session.engine().is_playing());
    assert!(h.current().is_playing());
    assert!(!h.snap().can_go_next);
    assert!(!h.snap().can_go_previous);

    h.session.pause().unwrap();
    h.session.next().unwrap();
    assert!(!h.session.engine().is_playing());
}

#[test]
fn shuffled_queue_jumps_to_another_track_at_end_of_media() {
    let mut h = Harness::new(policy(true, RepeatMode::Off));
    h.session.set_queue(tracks(&["A", "B", "C"]), 0);

    for _ in 0..10 {
        let before = h.index();
        h.finish_current();
        assert_ne!(h.index(), before);
        assert!(h.session.engine().is_playing());
        assert!(h.current().is_playing());
    }
    assert_eq!(h.plays().len(), 11);
}

#[test]
fn shuffle_never_picks_the_current_track() {
    let mut h = Harness::new(policy(true, RepeatMode::Off));
    h.session.set_queue(tracks(&["A", "B", "C", "D"]), 0);
    for _ in 0..50 {
        let before = h.index();
        h.session.next().unwrap();
        assert_ne!(h.index(), before);
    }
}

#[test]
fn repeat_one_replays_the_same_track() {
    let mut h = Harness::new(policy(false, RepeatMode::One));
    h.session.set_queue(tracks(&["A", "B"]), 0);
    h.session.seek(Duration::from_secs(100)).unwrap();

    h.finish_current();

    assert_eq!(h.index(), Some(0));
    assert!(h.session.engine().is_playing());
    assert_eq!(h.session.engine().position(), Duration::ZERO);
    assert!(h.current().is_playing());
    assert_eq!(h.current().file_name(), "a.mp3");
    // A replay is not a new play.
    assert_eq!(h.plays(), vec!["A"]);

    h.finish_current();
    assert_eq!(h.focus.held(), 1);
    h.session.pause().unwrap();
    assert_eq!(h.focus.held(), 0);
}

#[test]
fn repeat_all_wraps_in_both_directions() {
    let mut h = Harness::new(policy(false, RepeatMode::All));
    h.session.set_queue(tracks(&["A", "B", "C"]), 2);

    h.session.next().unwrap();
    assert_eq!(h.index(), Some(0));

    h.session.previous().unwrap();
    assert_eq!(h.index(), Some(2));

    h.finish_current();
    assert_eq!(h.index(), Some(0));
    assert!(h.session.engine().is_playing());
}

#[test]
fn queue_runs_out_and_rewinds_to_start_of_last_track() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B", "C"]), 0);

    h.finish_current();
    assert_eq!(h.index(), Some(1));
    assert!(h.session.engine().is_playing());

    h.finish_current();
    assert_eq!(h.index(), Some(2));
    assert!(h.session.engine().is_playing());

    h.finish_current();
    assert_eq!(h.index(), Some(2));
    assert!(!h.session.engine().is_playing());
    assert_eq!(h.session.engine().position(), Duration::ZERO);
    assert!(!h.snap().is_playing);

    assert_eq!(h.plays(), vec!["A", "B", "C"]);
}

#[test]
fn next_at_last_track_without_repeat_pauses_in_place() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B"]), 1);
    h.session.seek(Duration::from_secs(20)).unwrap();

    h.session.next().unwrap();

    assert_eq!(h.index(), Some(1));
    assert!(!h.session.engine().is_playing());
    assert_eq!(h.session.engine().position(), Duration::from_secs(20));
}

#[test]
fn previous_at_first_track_restarts_it() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B"]), 0);
    h.session.seek(Duration::from_secs(40)).unwrap();

    h.session.previous().unwrap();

    assert_eq!(h.index(), Some(0));
    assert_eq!(h.session.engine().position(), Duration::ZERO);
    assert!(h.session.engine().is_playing());
    assert_eq!(h.plays(), vec!["A"]);
}

#[test]
fn navigation_flags_match_what_navigation_does() {
    let cases = [
        (policy(false, RepeatMode::Off), 0),
        (policy(false, RepeatMode::Off), 2),
        (policy(false, RepeatMode::All), 0),
        (policy(false, RepeatMode::All), 2),
        (policy(false, RepeatMode::One), 1),
        (policy(true, RepeatMode::Off), 0),
    ];
    for (p, start) in cases {
        let mut h = Harness::new(p);
        h.session.set_queue(tracks(&["A", "B", "C"]), start);
        let snap = h.snap();

        h.session.next().unwrap();
        let moved = h.index() != Some(start);
        assert_eq!(snap.can_go_next, moved, "next with {p:?} from {start}");

        let mut h = Harness::new(p);
        h.session.set_queue(tracks(&["A", "B", "C"]), start);
        h.session.previous().unwrap();
        let moved = h.index() != Some(start);
        assert_eq!(snap.can_go_previous, moved, "previous with {p:?} from {start}");
    }
}

#[test]
fn policy_changes_update_capabilities() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B"]), 1);
    assert!(!h.snap().can_go_next);

    h.session.cycle_repeat_mode();
    assert_eq!(h.session.policy().repeat, RepeatMode::All);
    assert!(h.snap().can_go_next);
    assert!(h.calls().iter().any(|c| matches!(
        c,
        SinkCall::Caps(Capabilities { can_go_next: true, .. })
    )));

    h.session.toggle_shuffle();
    assert!(h.snap().policy.shuffle);

    h.session.set_repeat_mode(RepeatMode::Off);
    h.session.set_shuffle(false);
    assert!(!h.snap().can_go_next);
}

#[test]
fn events_from_a_replaced_source_are_ignored() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B", "C"]), 0);
    let first = h.current();

    h.session.next().unwrap();
    assert_eq!(h.index(), Some(1));

    // Nobody listens to the old source anymore.
    assert!(!first.finish());
    assert!(!first.emit(SourceEvent::Tick {
        position: Duration::from_secs(99),
        duration: Some(LENGTH),
    }));
    h.session.pump();

    assert_eq!(h.index(), Some(1));
    assert_eq!(h.session.engine().position(), Duration::ZERO);
}

#[test]
fn ticks_update_snapshot_and_progress() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);
    assert!(h.current().emit(SourceEvent::Tick {
        position: Duration::from_secs(12),
        duration: Some(LENGTH),
    }));
    h.session.pump();

    assert_eq!(h.snap().current_time, Duration::from_secs(12));
    assert!(h.calls().contains(&SinkCall::Progress(Progress {
        transport: Transport::Playing,
        elapsed: Duration::from_secs(12),
        rate: 1.0,
    })));
}

#[test]
fn duration_falls_back_to_catalog_until_media_reports_it() {
    let mut h = Harness::new(PlaybackPolicy::default());
    let mut t = track("Unknown");
    t.duration = "3:05".to_string();
    h.session.set_queue(vec![t], 0);

    let published = h.last_track_call().unwrap();
    assert_eq!(published.duration, Some(Duration::from_secs(185)));

    assert!(h.current().emit(SourceEvent::Tick {
        position: Duration::from_secs(1),
        duration: Some(Duration::from_secs(190)),
    }));
    h.session.pump();
    assert_eq!(
        h.last_track_call().unwrap().duration,
        Some(Duration::from_secs(190))
    );
}

#[test]
fn descriptor_carries_track_metadata() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A", "B"]), 1);

    let np = h.last_track_call().unwrap();
    assert_eq!(np.queue_index, 1);
    assert_eq!(np.title, "B");
    assert_eq!(np.artist, "Band");
    assert_eq!(np.album.as_deref(), Some("Record"));
    assert_eq!(np.track_id.as_deref(), Some("b"));
    assert_eq!(np.url.as_deref(), Some("file:///music/b.mp3"));
}

#[test]
fn artwork_is_merged_for_the_current_track_only() {
    let mut h = Harness::new(PlaybackPolicy::default());
    let mut a = track("A");
    a.cover_art = Some("/art/a.jpg".to_string());
    let mut b = track("B");
    b.cover_art = Some("/art/b.jpg".to_string());

    h.session.set_queue(vec![a, b], 0);
    h.session.next().unwrap();

    let merged = wait_for(|| {
        h.session.pump();
        h.calls().iter().any(|c| matches!(c, SinkCall::Artwork(_)))
    });
    assert!(merged);
    thread::sleep(Duration::from_millis(20));
    h.session.pump();

    let art: Vec<String> = h
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            SinkCall::Artwork(a) => Some(a),
            _ => None,
        })
        .collect();
    assert_eq!(art, vec!["file:///art/b.jpg".to_string()]);
}

#[test]
fn focus_refusal_leaves_engine_paused() {
    let focus = CountingFocus {
        refuse: true,
        ..CountingFocus::default()
    };
    let mut h = Harness::with_focus(PlaybackPolicy::default(), focus);
    h.session.set_queue(tracks(&["A"]), 0);

    assert!(h.session.engine().is_loaded());
    assert!(!h.session.engine().is_playing());
    assert!(!h.current().is_playing());
    assert!(h.session.play().is_ok());
    assert!(!h.snap().is_playing);
}

#[test]
fn load_failure_is_observable_and_next_track_recovers() {
    let mut h = Harness::new(PlaybackPolicy::default());
    let mut broken = track("Broken");
    broken.audio = "/music/broken.mp3".to_string();
    h.session.set_queue(vec![broken, track("B")], 0);

    assert!(!h.session.engine().is_playing());
    assert!(h.snap().fault.is_some());
    assert_eq!(h.snap().current_index, Some(0));

    h.session.next().unwrap();
    assert!(h.session.engine().is_playing());
    assert!(h.snap().fault.is_none());
}

#[test]
fn unresolvable_reference_is_a_fault() {
    let mut h = Harness::new(PlaybackPolicy::default());
    let mut orphan = track("Orphan");
    orphan.audio = "relative/only.mp3".to_string();
    h.session.set_queue(vec![orphan], 0);

    assert_eq!(h.opened_count(), 0);
    assert!(h.snap().fault.is_some());
    assert_eq!(h.last_track_call().unwrap().url, None);
}

#[test]
fn interruptions_pause_and_optionally_resume() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);

    h.session.interrupt(Interruption::Began).unwrap();
    assert!(!h.session.engine().is_playing());

    h.session
        .interrupt(Interruption::Ended {
            should_resume: false,
        })
        .unwrap();
    assert!(!h.session.engine().is_playing());

    h.session.interrupt(Interruption::Began).unwrap();
    h.session
        .interrupt(Interruption::Ended {
            should_resume: true,
        })
        .unwrap();
    assert!(h.session.engine().is_playing());
}

#[test]
fn stop_pauses_and_rewinds() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);
    h.session.seek(Duration::from_secs(50)).unwrap();

    h.session.handle(AudioCmd::Stop).unwrap();

    assert!(!h.session.engine().is_playing());
    assert_eq!(h.session.engine().position(), Duration::ZERO);
}

#[test]
fn skip_commands_jump_by_the_interval() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session = h.session.with_skip_interval(Duration::from_secs(10));
    h.session.set_queue(tracks(&["A"]), 0);

    h.session.handle(AudioCmd::SkipForward).unwrap();
    h.session.handle(AudioCmd::SkipForward).unwrap();
    assert_eq!(h.session.engine().position(), Duration::from_secs(20));

    h.session.handle(AudioCmd::SkipBackward).unwrap();
    assert_eq!(h.session.engine().position(), Duration::from_secs(10));
}

#[test]
fn release_happens_once_on_shutdown_and_drop() {
    let mut h = Harness::new(PlaybackPolicy::default());
    h.session.set_queue(tracks(&["A"]), 0);
    let source = h.current();

    h.session.shutdown(Duration::ZERO);
    assert!(!source.is_playing());
    assert_eq!(*source.volume.lock().unwrap(), 0.0);

    let calls = Arc::clone(&h.calls);
    drop(h);
    let releases = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| **c == SinkCall::Release)
        .count();
    assert_eq!(releases, 1);
}

#[test]
fn dropping_the_session_releases_the_surface() {
    let h = Harness::new(PlaybackPolicy::default());
    let calls = Arc::clone(&h.calls);
    drop(h);
    assert_eq!(calls.lock().unwrap().last(), Some(&SinkCall::Release));
}

#[test]
fn player_drives_session_on_audio_thread() {
    let output = FakeOutput::default();
    let opened = Arc::clone(&output.opened);
    let sink = RecordingSink::default();
    let calls = Arc::clone(&sink.calls);

    let deps = SessionDeps {
        output: Box::new(move || Ok(Box::new(output) as Box<dyn AudioOutput>)),
        focus: Box::new(SharedFocus),
        resolver: Arc::new(StorageResolver::default()),
        now_playing: Box::new(sink),
        history: None,
    };
    let config = SessionConfig {
        poll_interval: Duration::from_millis(5),
        ..SessionConfig::default()
    };
    let player = AudioPlayer::new(deps, config);

    player.set_queue(tracks(&["A", "B"]), 0).unwrap();
    assert!(wait_for(|| player.snapshot().is_playing));

    player.next().unwrap();
    assert!(wait_for(|| player.snapshot().current_index == Some(1)));
    assert_eq!(opened.lock().unwrap().len(), 2);

    let interruptions = player.interruption_handler();
    interruptions.notify(Interruption::Began).unwrap();
    assert!(wait_for(|| !player.snapshot().is_playing));

    player.quit_softly(Duration::ZERO);
    assert_eq!(calls.lock().unwrap().last(), Some(&SinkCall::Release));
    assert_eq!(player.play(), Err(PlaybackError::Disconnected));
}

#[test]
fn missing_output_device_degrades_to_faults() {
    let deps = SessionDeps {
        output: Box::new(|| Err(AudioError::NoDevice("no card".into()))),
        focus: Box::new(SharedFocus),
        resolver: Arc::new(StorageResolver::default()),
        now_playing: Box::new(Detached),
        history: None,
    };
    let player = AudioPlayer::new(deps, SessionConfig::default());
    player.set_queue(tracks(&["A"]), 0).unwrap();

    assert!(wait_for(|| player.snapshot().fault.is_some()));
    assert!(!player.snapshot().is_playing);
    player.quit_softly(Duration::ZERO);
}

#[test]
fn queue_replace_and_select() {
    let mut q = Queue::default();
    assert_eq!(q.replace(tracks(&["A", "B"]), 1), Some(1));
    assert_eq!(q.current().map(|t| t.name.as_str()), Some("B"));
    assert!(!q.select(5));
    assert_eq!(q.index(), Some(1));
    assert_eq!(q.replace(Vec::new(), 0), None);
    assert!(q.current().is_none());
}

#[test]
fn queue_end_of_media_with_lone_shuffled_track() {
    let mut q = Queue::default();
    q.replace(tracks(&["A"]), 0);
    let mut rng = StdRng::seed_from_u64(1);

    assert_eq!(
        q.end_of_media_step(policy(true, RepeatMode::All), &mut rng),
        Step::Replay
    );
    assert_eq!(
        q.end_of_media_step(policy(true, RepeatMode::Off), &mut rng),
        Step::Finish
    );
    assert_eq!(
        q.previous_step(policy(false, RepeatMode::Off), &mut rng),
        Step::Restart
    );
}
