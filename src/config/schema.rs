use std::path::PathBuf;

use serde::Deserialize;

/// Top-level settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/cadenza/config.toml`
/// or `~/.config/cadenza/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `CADENZA__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub playback: PlaybackSettings,
    pub remote: RemoteSettings,
    pub storage: StorageSettings,
    pub library: LibrarySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// How often the engine reports position/duration ticks (milliseconds).
    pub tick_interval_ms: u64,
    /// How long the control thread waits for a command before pumping engine events.
    pub poll_interval_ms: u64,
    /// Fade-out duration when quitting (milliseconds).
    /// Set to 0 to stop immediately.
    pub quit_fade_out_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            poll_interval_ms: 50,
            quit_fade_out_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Whether shuffle starts enabled.
    pub shuffle: bool,
    /// Initial repeat mode.
    pub repeat_mode: RepeatModeSetting,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            shuffle: false,
            repeat_mode: RepeatModeSetting::Off,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatModeSetting {
    #[serde(alias = "none", alias = "no-repeat", alias = "no_repeat")]
    Off,
    #[serde(alias = "repeat-all", alias = "repeat_all", alias = "playlist")]
    All,
    #[serde(alias = "repeat-one", alias = "repeat_one", alias = "track")]
    One,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Register the MPRIS media-control service on the session bus.
    pub enabled: bool,
    /// Suffix appended to `org.mpris.MediaPlayer2.` when requesting the bus name.
    pub bus_name: String,
    /// Seconds jumped by the skip-forward / skip-backward commands.
    pub skip_interval_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bus_name: "cadenza".to_string(),
            skip_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base URL of the object store; relative media references are joined onto it.
    pub base_url: Option<String>,
    /// Local directory relative media references resolve against when no base URL is set.
    pub media_root: Option<PathBuf>,
    /// Where history, favorites and the downloads index are persisted.
    /// Defaults to `$XDG_DATA_HOME/cadenza` (or `~/.local/share/cadenza`).
    pub data_dir: Option<PathBuf>,
    /// Where downloaded audio files are written. Defaults to `<data_dir>/downloads`.
    pub downloads_dir: Option<PathBuf>,
    /// Optional JSON catalog document (array of tracks) used instead of a directory scan.
    pub catalog_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
    /// How many history entries observers receive (0 = unbounded).
    pub history_limit: usize,
    /// How many plays the history keeps on disk (0 = unbounded).
    pub history_capacity: usize,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            extensions: vec![
                "mp3".into(),
                "flac".into(),
                "wav".into(),
                "ogg".into(),
                "m4a".into(),
            ],
            follow_links: true,
            include_hidden: false,
            recursive: true,
            max_depth: None,
            history_limit: 50,
            history_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for the daily rotated log file.
    pub directory: PathBuf,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".logs"),
            filter: "cadenza=debug,zbus=warn,warn".to_string(),
        }
    }
}
