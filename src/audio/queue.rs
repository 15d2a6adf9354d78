//! The ordered track list and the next/previous resolution rules.
//!
//! Every navigation decision (`next`, `previous`, end-of-media) and the
//! matching `can_go_*` answer are derived from the same `Target` so the two
//! can never disagree.

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::library::Track;

use super::types::{PlaybackPolicy, RepeatMode};

/// What the session should do in response to a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Make this index current and play it.
    Switch(usize),
    /// Seek the current track back to 0, keeping the transport state.
    Restart,
    /// Seek the current track back to 0 and play it.
    Replay,
    /// Pause where we are.
    Pause,
    /// Pause and rewind to 0; the queue has run out.
    Finish,
    /// Nothing to do.
    Stay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Index(usize),
    /// Uniform draw among every index except the current one.
    Shuffle,
    /// At the edge of the queue and not wrapping.
    Boundary,
    /// No candidate at all (empty queue, or shuffle over a single track).
    Nothing,
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    index: Option<usize>,
}

impl Queue {
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn current(&self) -> Option<&Track> {
        self.index.and_then(|i| self.tracks.get(i))
    }

    /// Replace the contents. Returns the starting index: `start_at` when it is
    /// in range, otherwise the first track. `None` for an empty list.
    pub fn replace(&mut self, tracks: Vec<Track>, start_at: usize) -> Option<usize> {
        self.tracks = tracks;
        self.index = if self.tracks.is_empty() {
            None
        } else if start_at < self.tracks.len() {
            Some(start_at)
        } else {
            Some(0)
        };
        self.index
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.index = None;
    }

    /// Make `index` current. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.index = Some(index);
            true
        } else {
            false
        }
    }

    fn target(&self, policy: PlaybackPolicy, dir: Direction) -> Target {
        let Some(idx) = self.index else {
            return Target::Nothing;
        };
        let len = self.tracks.len();

        if policy.shuffle {
            return if len > 1 {
                Target::Shuffle
            } else {
                Target::Nothing
            };
        }

        match dir {
            Direction::Forward if idx + 1 < len => Target::Index(idx + 1),
            Direction::Backward if idx > 0 => Target::Index(idx - 1),
            Direction::Forward if policy.repeat == RepeatMode::All => Target::Index(0),
            Direction::Backward if policy.repeat == RepeatMode::All => Target::Index(len - 1),
            _ => Target::Boundary,
        }
    }

    /// Every index but the current one; `None` when that set is empty.
    fn random_other<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let candidates: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| Some(i) != self.index)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.choose(rng).copied()
    }

    fn resolve<R: Rng + ?Sized>(&self, target: Target, rng: &mut R, at_boundary: Step) -> Step {
        match target {
            Target::Index(i) => Step::Switch(i),
            Target::Shuffle => self.random_other(rng).map_or(Step::Stay, Step::Switch),
            Target::Boundary => at_boundary,
            Target::Nothing => Step::Stay,
        }
    }

    pub fn can_go_next(&self, policy: PlaybackPolicy) -> bool {
        matches!(
            self.target(policy, Direction::Forward),
            Target::Index(_) | Target::Shuffle
        )
    }

    pub fn can_go_previous(&self, policy: PlaybackPolicy) -> bool {
        matches!(
            self.target(policy, Direction::Backward),
            Target::Index(_) | Target::Shuffle
        )
    }

    /// Manual skip forward. At the last index without wrap this pauses in place.
    pub fn next_step<R: Rng + ?Sized>(&self, policy: PlaybackPolicy, rng: &mut R) -> Step {
        self.resolve(self.target(policy, Direction::Forward), rng, Step::Pause)
    }

    /// Manual skip backward. At the first index without wrap this restarts the track.
    pub fn previous_step<R: Rng + ?Sized>(&self, policy: PlaybackPolicy, rng: &mut R) -> Step {
        self.resolve(self.target(policy, Direction::Backward), rng, Step::Restart)
    }

    /// What happens when the current track plays to its end.
    pub fn end_of_media_step<R: Rng + ?Sized>(&self, policy: PlaybackPolicy, rng: &mut R) -> Step {
        if self.index.is_none() {
            return Step::Stay;
        }
        match policy.repeat {
            RepeatMode::One => Step::Replay,
            // A lone shuffled track has nowhere to go; keep looping it.
            RepeatMode::All => match self.next_step(policy, rng) {
                Step::Stay => Step::Replay,
                step => step,
            },
            RepeatMode::Off => match self.resolve(
                self.target(policy, Direction::Forward),
                rng,
                Step::Finish,
            ) {
                Step::Stay => Step::Finish,
                step => step,
            },
        }
    }
}
