//! `rodio` backend for the playback engine.
//!
//! Local files are decoded straight from disk. Remote sources are streamed:
//! a background download fills a temp file while the decoder reads from it,
//! so loading only waits for the first bytes. Every source gets its own
//! paused `Sink` on the shared output stream.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use lofty::prelude::*;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use stream_download::storage::temp::TempStorageProvider;
use stream_download::{Settings, StreamDownload};
use tokio::runtime::{self, Runtime};
use tracing::debug;
use url::Url;

use crate::error::AudioError;
use crate::resolver::MediaUrl;

use super::output::{AudioOutput, LoadedSource};

type Decoded = (Box<dyn Source + Send>, Option<Duration>);

/// Reader over a download that keeps filling in the background.
///
/// Reads past the downloaded range block until the bytes arrive.
struct Progressive(Mutex<StreamDownload<TempStorageProvider>>);

impl Read for Progressive {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .read(buf)
    }
}

impl Seek for Progressive {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .seek(pos)
    }
}

/// Where a source's bytes come from, kept so it can be re-decoded.
enum Origin {
    File(PathBuf),
    Remote { url: Url, fetcher: runtime::Handle },
}

impl Origin {
    fn label(&self) -> String {
        match self {
            Self::File(p) => p.display().to_string(),
            Self::Remote { url, .. } => url.to_string(),
        }
    }

    /// A fresh decoder for this origin, already skipped to `start_at`.
    fn decode(&self, start_at: Duration) -> Result<Decoded, AudioError> {
        match self {
            Self::File(path) => {
                let file = File::open(path).map_err(|source| AudioError::Open {
                    path: path.clone(),
                    source,
                })?;
                let decoder = Decoder::new(BufReader::new(file))
                    .map_err(|e| AudioError::Decode(format!("{}: {e}", path.display())))?;
                Ok(skipped(decoder, start_at))
            }
            Self::Remote { url, fetcher } => {
                let fetch_err = |reason: String| AudioError::Fetch {
                    url: url.to_string(),
                    reason,
                };
                let download = fetcher
                    .block_on(StreamDownload::new_http(
                        url.clone(),
                        TempStorageProvider::new(),
                        Settings::default(),
                    ))
                    .map_err(|e| fetch_err(e.to_string()))?;
                let decoder = Decoder::new(Progressive(Mutex::new(download)))
                    .map_err(|e| AudioError::Decode(format!("{url}: {e}")))?;
                Ok(skipped(decoder, start_at))
            }
        }
    }
}

fn skipped<R>(decoder: Decoder<R>, start_at: Duration) -> Decoded
where
    R: Read + Seek + Send + Sync + 'static,
{
    let total = decoder.total_duration();
    // `skip_duration` is the fallback seeking primitive; Duration::ZERO is a no-op.
    (Box::new(decoder.skip_duration(start_at)), total)
}

/// A decoded source playing through its own `Sink`.
pub struct RodioSource {
    sink: Sink,
    origin: Origin,
    duration: Option<Duration>,
    /// Start offset of the current decoder when seeking fell back to a rebuild.
    offset: Mutex<Duration>,
    /// Set while the sink's queue is being swapped; the sink is briefly empty.
    rebuilding: AtomicBool,
}

impl RodioSource {
    fn new(sink: Sink, origin: Origin, duration: Option<Duration>) -> Self {
        Self {
            sink,
            origin,
            duration,
            offset: Mutex::new(Duration::ZERO),
            rebuilding: AtomicBool::new(false),
        }
    }

    fn set_offset(&self, to: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    /// Replace the queued decoder with one starting at `to`.
    ///
    /// The new decoder is built first; on failure the current one keeps playing.
    fn rebuild(&self, to: Duration) -> Result<(), AudioError> {
        let (source, _) = self.origin.decode(to)?;
        let paused = self.sink.is_paused();
        self.rebuilding.store(true, Ordering::SeqCst);
        self.sink.clear();
        self.sink.append(source);
        self.set_offset(to);
        if !paused {
            self.sink.play();
        }
        self.rebuilding.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl LoadedSource for RodioSource {
    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn seek(&self, to: Duration) -> Result<(), AudioError> {
        match self.sink.try_seek(to) {
            Ok(()) => {
                self.set_offset(Duration::ZERO);
                Ok(())
            }
            Err(seek_err) => {
                debug!(
                    origin = %self.origin.label(),
                    error = %seek_err,
                    "seek unsupported, rebuilding source"
                );
                self.rebuild(to)
                    .map_err(|e| AudioError::Seek(format!("{seek_err}; rebuild failed: {e}")))
            }
        }
    }

    fn position(&self) -> Duration {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        offset + self.sink.get_pos()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn is_finished(&self) -> bool {
        !self.rebuilding.load(Ordering::SeqCst) && self.sink.empty()
    }

    fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume);
    }
}

/// The default output device.
pub struct RodioOutput {
    stream: OutputStream,
    /// Drives the background downloads of remote sources.
    fetcher: Runtime,
}

impl RodioOutput {
    pub fn open_default() -> Result<Self, AudioError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| AudioError::NoDevice(e.to_string()))?;
        // rodio logs to stderr when OutputStream is dropped; stderr belongs to the command surface.
        stream.log_on_drop(false);

        let fetcher = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cadenza-fetch")
            .enable_all()
            .build()
            .map_err(|e| AudioError::NoDevice(format!("fetch runtime: {e}")))?;

        Ok(Self { stream, fetcher })
    }
}

fn tagged_duration(path: &Path) -> Option<Duration> {
    lofty::read_from_path(path)
        .ok()
        .map(|tagged| tagged.properties().duration())
        .filter(|d| !d.is_zero())
}

impl AudioOutput for RodioOutput {
    fn open(&mut self, media: &MediaUrl) -> Result<Arc<dyn LoadedSource>, AudioError> {
        let origin = match media {
            MediaUrl::Local(path) => Origin::File(path.clone()),
            MediaUrl::Remote(url) => Origin::Remote {
                url: url.clone(),
                fetcher: self.fetcher.handle().clone(),
            },
        };

        let (source, decoded) = origin.decode(Duration::ZERO)?;
        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.append(source);

        let duration = decoded.or_else(|| match media {
            MediaUrl::Local(path) => tagged_duration(path),
            MediaUrl::Remote(_) => None,
        });
        if duration.is_none() {
            debug!(media = %media, "duration unknown until playback reports it");
        }

        Ok(Arc::new(RodioSource::new(sink, origin, duration)))
    }
}
