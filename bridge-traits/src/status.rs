//! Player status samples.
//!
//! A [`StatusSample`] is one answer to "what is the player doing", stamped
//! with the monotonic window in which the answer was produced. The true
//! moment the player sampled its state lies somewhere inside that window,
//! which is why every time comparison in the engine works on ranges.

use core_async::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback state reported by a player instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    /// State a pause/resume toggle would move to. `None` for `Stopped`.
    pub fn toggled(self) -> Option<Self> {
        match self {
            PlaybackState::Playing => Some(PlaybackState::Paused),
            PlaybackState::Paused => Some(PlaybackState::Playing),
            PlaybackState::Stopped => None,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Closed interval of monotonic instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: Instant,
    pub end: Instant,
}

impl TimeRange {
    /// Builds a range, swapping the bounds if they arrive reversed.
    pub fn new(a: Instant, b: Instant) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Zero-length range at `at`.
    pub fn point(at: Instant) -> Self {
        Self { start: at, end: at }
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    pub fn center(&self) -> Instant {
        self.start + self.length() / 2
    }

    pub fn contains(&self, at: Instant) -> bool {
        self.start <= at && at <= self.end
    }
}

/// One observation of a player's state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSample {
    /// Request/response window bounding the moment of observation.
    pub window: TimeRange,
    /// Media length in whole seconds. Zero when unknown.
    pub length_secs: u32,
    pub rate: f64,
    pub state: PlaybackState,
    /// Normalized position in `[0, 1]`.
    pub position: f64,
    pub file_name: String,
    pub file_uri: String,
}

impl StatusSample {
    /// Media length as a duration.
    pub fn length(&self) -> Duration {
        Duration::from_secs(u64::from(self.length_secs))
    }

    /// Playback time in seconds, derived from the normalized position.
    pub fn playback_time_secs(&self) -> f64 {
        self.position * f64::from(self.length_secs)
    }

    pub fn has_file(&self) -> bool {
        !self.file_uri.is_empty()
    }
}

impl fmt::Display for StatusSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pos={:.4} rate={} len={}s file={:?} window={:?}",
            self.state,
            self.position,
            self.rate,
            self.length_secs,
            self.file_uri,
            self.window.length()
        )
    }
}
