//! Track catalog: tracks, playlists and artists, directory scanning and lookup/search.

mod catalog;
mod display;
mod model;
mod scan;

pub use catalog::{LocalCatalog, TrackCatalog, search_locally};
pub use display::{format_clock, format_clock_opt, parse_clock};
pub use model::{Artist, Playlist, Track, TrackId};
pub use scan::scan;
