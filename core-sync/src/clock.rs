//! # Playback Clock
//!
//! Decides whether a position change is ordinary playback progress or a
//! manual seek, and extrapolates where a player should be at a given instant.
//!
//! ## Overview
//!
//! Players report their position with coarse granularity and the moment of
//! each observation is only known within its request window. The clock
//! therefore compares ranges, not points:
//!
//! - the **actual** playback-time delta since the anchor, widened by the
//!   position slack on both ends,
//! - the **expected** delta, the wall-clock time elapsed since the anchor
//!   (uncertain by both windows) multiplied by the playback rate.
//!
//! The change is natural when the two ranges overlap.
//!
//! The slack of one observation is `max_playback_step * max(rate, 1) *
//! position_error_factor` seconds of playback time.

use crate::range::{elapsed, Range};
use bridge_traits::{PlaybackState, StatusSample, TimeRange};
use core_runtime::SyncTimings;

/// Reference point for extrapolating playback while an instance plays.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackAnchor {
    pub window: TimeRange,
    pub position: f64,
    pub rate: f64,
    /// Playback time of the anchor sample, widened by the position slack.
    pub playback_time: Range,
}

/// Interval arithmetic over status samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    step_secs: f64,
    error_factor: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(&SyncTimings::default())
    }
}

impl PlaybackClock {
    pub fn new(timings: &SyncTimings) -> Self {
        Self {
            step_secs: timings.max_playback_step.as_secs_f64(),
            error_factor: timings.position_error_factor,
        }
    }

    /// Slack of one observation, in seconds of playback time.
    fn slack_secs(&self, rate: f64) -> f64 {
        self.step_secs * rate.max(1.0) * self.error_factor
    }

    /// Normalized position range a reported `position` may stand for.
    pub fn position_range(&self, position: f64, length_secs: u32, rate: f64) -> Range {
        if length_secs == 0 {
            return Range::point(position);
        }
        Range::with_len(position, self.slack_secs(rate) / f64::from(length_secs))
    }

    /// Playback-time range (seconds) a reported playback time may stand for.
    pub fn playback_time_range(&self, playback_time_secs: f64, rate: f64) -> Range {
        Range::with_len(playback_time_secs, self.slack_secs(rate))
    }

    /// Acceptable distance between a reported and an expected position.
    pub fn position_tolerance(&self, length_secs: u32, rate: f64) -> f64 {
        self.position_range(0.0, length_secs, rate).length()
    }

    pub fn anchor(&self, sample: &StatusSample) -> PlaybackAnchor {
        PlaybackAnchor {
            window: sample.window,
            position: sample.position,
            rate: sample.rate,
            playback_time: self.playback_time_range(sample.playback_time_secs(), sample.rate),
        }
    }

    /// Playback time that actually passed between the anchor and `new`.
    pub fn actual_delta(&self, anchor: &PlaybackAnchor, new: &StatusSample) -> Range {
        if anchor.position == new.position {
            return self.playback_time_range(0.0, new.rate);
        }
        self.playback_time_range(new.playback_time_secs(), new.rate)
            .sub(&anchor.playback_time)
    }

    /// Playback time that should have passed between the anchor and `new`
    /// if nobody touched the player.
    pub fn expected_delta(
        &self,
        anchor: &PlaybackAnchor,
        prev: &StatusSample,
        new: &StatusSample,
    ) -> Range {
        if new.rate == prev.rate {
            return elapsed(&new.window, &anchor.window).scale(new.rate);
        }

        // The rate changed somewhere between prev and new.
        let prev_to_new =
            elapsed(&new.window, &prev.window).scale_by_range(&Range::unordered(new.rate, prev.rate));
        if anchor.window == prev.window {
            return prev_to_new;
        }
        let anchor_to_prev = elapsed(&prev.window, &anchor.window).scale(anchor.rate);
        anchor_to_prev.add(&prev_to_new)
    }

    /// Whether the position change from `prev` to `new` is explained by
    /// playback progress since `anchor`.
    pub fn is_natural_progress(
        &self,
        anchor: Option<&PlaybackAnchor>,
        prev: &StatusSample,
        new: &StatusSample,
    ) -> bool {
        let Some(anchor) = anchor else {
            return false;
        };
        if new.state != PlaybackState::Playing || new.position < prev.position {
            return false;
        }
        let actual = self.actual_delta(anchor, new);
        let expected = self.expected_delta(anchor, prev, new);
        actual.intersects(&expected)
    }
}
