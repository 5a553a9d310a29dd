//! # Synchronizer Configuration
//!
//! Live user settings and the empirical timing constants of the engine.
//!
//! ## Overview
//!
//! - [`SyncSettings`] holds the user-facing knobs as observable
//!   [`Value`]s, so running components pick up changes without a restart
//!   (the poll loop re-reads the interval every round, the instance count
//!   triggers launches, the click toggle is pushed to every instance).
//! - [`SettingsPatch`] is a partial update, typically parsed from JSON. It is
//!   validated against the patched snapshot before anything is applied.
//! - [`SyncTimings`] groups the tunable constants. Defaults are the values
//!   the engine was calibrated with; tests shrink them.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::{SettingsPatch, SyncSettings};
//!
//! let settings = SyncSettings::default();
//! let patch: SettingsPatch = serde_json::from_str(r#"{"instances_number": 3}"#).unwrap();
//!
//! assert!(settings.apply_patch(&patch).unwrap());
//! assert_eq!(settings.instances_number.get(), 3);
//!
//! let invalid: SettingsPatch = serde_json::from_str(r#"{"instances_number": 1}"#).unwrap();
//! assert!(settings.apply_patch(&invalid).is_err());
//! assert_eq!(settings.instances_number.get(), 3);
//! ```

use crate::error::{Error, Result};
use crate::observable::Value;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum number of player instances a session keeps open.
pub const MIN_INSTANCES_NUMBER: usize = 2;

/// Live, observable user settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Target number of player instances.
    pub instances_number: Value<usize>,
    /// Launch new instances without video output.
    pub no_video: Value<bool>,
    /// Delay between status polls of each instance.
    pub polling_interval: Value<Duration>,
    /// Toggle pause on all players when a video surface is clicked.
    pub click_pause: Value<bool>,
    /// Also re-seek the player the change came from.
    pub re_seek_src: Value<bool>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_snapshot(SettingsSnapshot::default())
    }
}

impl SyncSettings {
    pub fn from_snapshot(snapshot: SettingsSnapshot) -> Self {
        Self {
            instances_number: Value::new(snapshot.instances_number),
            no_video: Value::new(snapshot.no_video),
            polling_interval: Value::new(snapshot.polling_interval),
            click_pause: Value::new(snapshot.click_pause),
            re_seek_src: Value::new(snapshot.re_seek_src),
        }
    }

    /// Current values as plain data.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            instances_number: self.instances_number.get(),
            no_video: self.no_video.get(),
            polling_interval: self.polling_interval.get(),
            click_pause: self.click_pause.get(),
            re_seek_src: self.re_seek_src.get(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.snapshot().validate()
    }

    /// Applies `patch` if the result is valid.
    ///
    /// Returns whether any value changed. Subscribers are only notified for
    /// values that actually changed.
    ///
    /// # Errors
    ///
    /// [`Error::SettingsPatchInvalid`] when the patched settings would not
    /// validate. Nothing is applied in that case.
    pub fn apply_patch(&self, patch: &SettingsPatch) -> Result<bool> {
        let mut candidate = self.snapshot();
        patch.apply_to(&mut candidate);
        candidate
            .validate()
            .map_err(|e| Error::SettingsPatchInvalid(e.to_string()))?;

        let mut changed = false;
        changed |= self.instances_number.set_if_changed(candidate.instances_number);
        changed |= self.no_video.set_if_changed(candidate.no_video);
        changed |= self.polling_interval.set_if_changed(candidate.polling_interval);
        changed |= self.click_pause.set_if_changed(candidate.click_pause);
        changed |= self.re_seek_src.set_if_changed(candidate.re_seek_src);
        Ok(changed)
    }
}

/// Plain copy of [`SyncSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub instances_number: usize,
    pub no_video: bool,
    pub polling_interval: Duration,
    pub click_pause: bool,
    pub re_seek_src: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            instances_number: MIN_INSTANCES_NUMBER,
            no_video: false,
            polling_interval: Duration::from_millis(100),
            click_pause: true,
            re_seek_src: true,
        }
    }
}

impl SettingsSnapshot {
    pub fn validate(&self) -> Result<()> {
        if self.instances_number < MIN_INSTANCES_NUMBER {
            return Err(Error::Config(format!(
                "instances_number must be at least {}, got {}",
                MIN_INSTANCES_NUMBER, self.instances_number
            )));
        }
        if self.polling_interval.is_zero() {
            return Err(Error::Config(
                "polling_interval must be greater than 0ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial settings update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsPatch {
    pub instances_number: Option<usize>,
    pub no_video: Option<bool>,
    pub polling_interval_ms: Option<u64>,
    pub click_pause: Option<bool>,
    pub re_seek_src: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, snapshot: &mut SettingsSnapshot) {
        if let Some(n) = self.instances_number {
            snapshot.instances_number = n;
        }
        if let Some(no_video) = self.no_video {
            snapshot.no_video = no_video;
        }
        if let Some(ms) = self.polling_interval_ms {
            snapshot.polling_interval = Duration::from_millis(ms);
        }
        if let Some(click_pause) = self.click_pause {
            snapshot.click_pause = click_pause;
        }
        if let Some(re_seek_src) = self.re_seek_src {
            snapshot.re_seek_src = re_seek_src;
        }
    }
}

/// Tunable timing constants of the synchronizer.
///
/// # Examples
///
/// ```rust
/// use core_runtime::config::SyncTimings;
/// use std::time::Duration;
///
/// let timings = SyncTimings::default()
///     .with_commands_repeat_interval(Duration::from_millis(10))
///     .with_wait_for_shutdown_after_stop(Duration::from_millis(100));
/// timings.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTimings {
    /// Upper bound of how far playback can move between two observations
    /// that report the same position (player position granularity).
    pub max_playback_step: Duration,
    /// Safety multiplier applied to `max_playback_step`.
    pub position_error_factor: f64,
    /// How long a freshly opened file needs before its own auto-seek settles.
    pub wait_for_auto_seek_after_file_opened: Duration,
    /// Retry interval for commands that must eventually be applied.
    pub commands_repeat_interval: Duration,
    /// Grace period before a Stopped update is reported, so a stop that is
    /// really a shutdown is not broadcast to the other players.
    pub wait_for_shutdown_after_stop: Duration,
    /// After a sync round, follower updates are ignored for this many
    /// polling intervals.
    pub skip_follower_updates_polling_intervals: f64,
    /// Upper bound of seek passes in one position convergence loop.
    pub max_convergence_rounds: u32,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            max_playback_step: Duration::from_millis(500),
            position_error_factor: 2.0,
            wait_for_auto_seek_after_file_opened: Duration::from_millis(1000),
            commands_repeat_interval: Duration::from_millis(50),
            wait_for_shutdown_after_stop: Duration::from_millis(500),
            skip_follower_updates_polling_intervals: 1.5,
            max_convergence_rounds: 10,
        }
    }
}

impl SyncTimings {
    pub fn with_max_playback_step(mut self, step: Duration) -> Self {
        self.max_playback_step = step;
        self
    }

    pub fn with_position_error_factor(mut self, factor: f64) -> Self {
        self.position_error_factor = factor;
        self
    }

    pub fn with_wait_for_auto_seek_after_file_opened(mut self, wait: Duration) -> Self {
        self.wait_for_auto_seek_after_file_opened = wait;
        self
    }

    pub fn with_commands_repeat_interval(mut self, interval: Duration) -> Self {
        self.commands_repeat_interval = interval;
        self
    }

    pub fn with_wait_for_shutdown_after_stop(mut self, wait: Duration) -> Self {
        self.wait_for_shutdown_after_stop = wait;
        self
    }

    pub fn with_skip_follower_updates_polling_intervals(mut self, intervals: f64) -> Self {
        self.skip_follower_updates_polling_intervals = intervals;
        self
    }

    pub fn with_max_convergence_rounds(mut self, rounds: u32) -> Self {
        self.max_convergence_rounds = rounds;
        self
    }

    /// How long follower updates are ignored after a sync round.
    pub fn follower_skip_duration(&self, polling_interval: Duration) -> Duration {
        polling_interval.mul_f64(self.skip_follower_updates_polling_intervals)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_playback_step.is_zero() {
            return Err(Error::Config(
                "max_playback_step must be greater than 0ms".to_string(),
            ));
        }
        if !self.position_error_factor.is_finite() || self.position_error_factor < 1.0 {
            return Err(Error::Config(format!(
                "position_error_factor must be a finite value >= 1, got {}",
                self.position_error_factor
            )));
        }
        if self.commands_repeat_interval.is_zero() {
            return Err(Error::Config(
                "commands_repeat_interval must be greater than 0ms".to_string(),
            ));
        }
        if !self.skip_follower_updates_polling_intervals.is_finite()
            || self.skip_follower_updates_polling_intervals < 0.0
        {
            return Err(Error::Config(format!(
                "skip_follower_updates_polling_intervals must be a finite value >= 0, got {}",
                self.skip_follower_updates_polling_intervals
            )));
        }
        if self.max_convergence_rounds == 0 {
            return Err(Error::Config(
                "max_convergence_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
