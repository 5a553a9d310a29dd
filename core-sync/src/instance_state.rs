//! # Instance State
//!
//! Last known status of one player plus its playback anchor.
//!
//! ## Overview
//!
//! `InstanceState` is the only place that knows what a player looked like
//! the last time we asked. It answers three questions:
//!
//! - what changed in a new sample, and is the change natural
//!   ([`get_update`](InstanceState::get_update)),
//! - which commands would make another player look like this one
//!   ([`get_sync_commands`](InstanceState::get_sync_commands)),
//! - where this player should be at an arbitrary instant
//!   ([`get_expected_position`](InstanceState::get_expected_position)).
//!
//! All access goes through one `parking_lot::RwLock`; no method holds it
//! across an await point.

use crate::changed_fields::ChangedFields;
use crate::clock::{PlaybackAnchor, PlaybackClock};
use crate::error::{Result, SyncError};
use crate::range::{elapsed, Range};
use crate::update::Update;
use crate::url::same_file;
use bridge_traits::{CommandGroup, ExpectedPositionGetter, PlaybackState, StatusSample, TimeRange};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    last: Option<StatusSample>,
    anchor: Option<PlaybackAnchor>,
    /// Set by the sample that opened the current file, cleared by the next.
    file_just_opened: bool,
}

/// Thread-safe last-known state of one player.
#[derive(Debug, Default)]
pub struct InstanceState {
    inner: RwLock<Inner>,
    clock: PlaybackClock,
}

fn is_stale(prev: &StatusSample, new: &StatusSample) -> bool {
    new.window.start < prev.window.end
}

impl InstanceState {
    pub fn new(clock: PlaybackClock) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    pub fn last_sample(&self) -> Option<StatusSample> {
        self.inner.read().last.clone()
    }

    pub fn anchor(&self) -> Option<PlaybackAnchor> {
        self.inner.read().anchor.clone()
    }

    /// Records `sample` as the latest observation. Stale samples are ignored.
    pub fn apply_new_status(&self, sample: &StatusSample) {
        let mut inner = self.inner.write();
        self.apply_locked(&mut inner, sample);
    }

    fn apply_locked(&self, inner: &mut Inner, sample: &StatusSample) {
        let file_changed = match &inner.last {
            Some(prev) if is_stale(prev, sample) => return,
            Some(prev) => !same_file(&prev.file_uri, &sample.file_uri),
            None => true,
        };

        inner.last = Some(sample.clone());
        if file_changed {
            // Position and rate settle on the sample after an open.
            inner.anchor = None;
            inner.file_just_opened =
                sample.has_file() && sample.state != PlaybackState::Stopped;
            return;
        }
        inner.file_just_opened = false;

        let keep_anchor = sample.state == PlaybackState::Playing
            && inner
                .anchor
                .as_ref()
                .is_some_and(|a| a.position == sample.position && a.rate == sample.rate);

        if sample.state != PlaybackState::Playing {
            inner.anchor = None;
        } else if !keep_anchor {
            inner.anchor = Some(self.clock.anchor(sample));
        }
    }

    /// Classifies `sample` against the last applied one without mutating.
    ///
    /// The first sample naming a playing or paused file reports every field.
    /// A sample on a different file reports only [`ChangedFields::FILE_URI`],
    /// and the sample after it reports position, rate and state so the
    /// freshly opened file gets pushed as a whole.
    ///
    /// # Errors
    ///
    /// [`SyncError::StaleSample`] if `sample` is older than the last applied
    /// observation.
    pub fn get_update(&self, sample: &StatusSample) -> Result<Update> {
        let inner = self.inner.read();
        self.update_locked(&inner, sample)
    }

    fn update_locked(&self, inner: &Inner, sample: &StatusSample) -> Result<Update> {
        let Some(prev) = &inner.last else {
            let changed = if sample.has_file() && sample.state != PlaybackState::Stopped {
                ChangedFields::all()
            } else {
                ChangedFields::empty()
            };
            return Ok(Update {
                is_natural: false,
                changed,
                sample: sample.clone(),
            });
        };

        if is_stale(prev, sample) {
            return Err(SyncError::StaleSample);
        }

        if !same_file(&prev.file_uri, &sample.file_uri) {
            return Ok(Update {
                is_natural: false,
                changed: ChangedFields::FILE_URI,
                sample: sample.clone(),
            });
        }

        if inner.file_just_opened {
            return Ok(Update {
                is_natural: false,
                changed: ChangedFields::POSITION | ChangedFields::RATE | ChangedFields::STATE,
                sample: sample.clone(),
            });
        }

        let mut changed = ChangedFields::empty();
        changed.set(ChangedFields::STATE, prev.state != sample.state);
        changed.set(ChangedFields::RATE, prev.rate != sample.rate);

        let mut natural_position = true;
        if prev.position != sample.position {
            changed.insert(ChangedFields::POSITION);
            natural_position = self
                .clock
                .is_natural_progress(inner.anchor.as_ref(), prev, sample);
        }
        let is_natural = natural_position && changed.without(ChangedFields::POSITION).is_empty();

        Ok(Update {
            is_natural,
            changed,
            sample: sample.clone(),
        })
    }

    /// Classifies `sample` and applies it under a single write lock.
    pub fn apply_new_status_and_get_update(&self, sample: &StatusSample) -> Result<Update> {
        let mut inner = self.inner.write();
        let update = self.update_locked(&inner, sample)?;
        self.apply_locked(&mut inner, sample);
        Ok(update)
    }

    /// Non-position fields in which the last applied sample differs from
    /// `sample`, regardless of which of the two is newer.
    pub fn differing_fields(&self, sample: &StatusSample) -> ChangedFields {
        let inner = self.inner.read();
        let Some(prev) = &inner.last else {
            return ChangedFields::all().without(ChangedFields::POSITION);
        };
        if !same_file(&prev.file_uri, &sample.file_uri) {
            return ChangedFields::FILE_URI;
        }
        let mut fields = ChangedFields::empty();
        fields.set(ChangedFields::STATE, prev.state != sample.state);
        fields.set(ChangedFields::RATE, prev.rate != sample.rate);
        fields
    }

    /// Commands that make another player match this one, restricted to
    /// `fields`.
    pub fn get_sync_commands(&self, fields: ChangedFields) -> CommandGroup {
        let inner = self.inner.read();
        let Some(prev) = &inner.last else {
            return CommandGroup::default();
        };

        let mut commands = CommandGroup::default();
        if fields.contains(ChangedFields::FILE_URI) {
            commands.open_file = Some(prev.file_uri.clone());
        }
        if fields.contains(ChangedFields::POSITION) {
            commands.seek = self.expected_position_locked(&inner);
        }
        if fields.contains(ChangedFields::RATE) {
            commands.rate = Some(prev.rate);
        }
        if fields.contains(ChangedFields::STATE) {
            commands.state = Some(prev.state);
        }
        commands
    }

    /// Commands toggling this player between playing and paused, with a seek
    /// keeping everyone on the current position. Empty unless the player is
    /// playing or paused.
    pub fn get_pause_or_resume_commands(&self) -> CommandGroup {
        let inner = self.inner.read();
        let Some(target) = inner.last.as_ref().and_then(|prev| prev.state.toggled()) else {
            return CommandGroup::default();
        };

        CommandGroup {
            seek: self.expected_position_locked(&inner),
            state: Some(target),
            ..CommandGroup::default()
        }
    }

    /// Function extrapolating this player's position to any instant.
    ///
    /// `None` when nothing is known or the player is stopped.
    pub fn get_expected_position(&self) -> Option<ExpectedPositionGetter> {
        let inner = self.inner.read();
        self.expected_position_locked(&inner)
    }

    fn expected_position_locked(&self, inner: &Inner) -> Option<ExpectedPositionGetter> {
        let prev = inner.last.as_ref()?;

        match prev.state {
            PlaybackState::Stopped => None,
            PlaybackState::Paused => {
                let position = self
                    .clock
                    .position_range(prev.position, prev.length_secs, prev.rate)
                    .center();
                Some(Arc::new(move |_| position))
            }
            PlaybackState::Playing if prev.length_secs == 0 => {
                let position = prev.position;
                Some(Arc::new(move |_| position))
            }
            PlaybackState::Playing => {
                let length = f64::from(prev.length_secs);
                let position_at_prev = match &inner.anchor {
                    Some(anchor) if anchor.position != prev.position => {
                        self.tightened_position_range(anchor, prev, length)
                    }
                    _ => self
                        .clock
                        .position_range(prev.position, prev.length_secs, prev.rate),
                };
                let per_sec = prev.rate / length;
                let prev_window = prev.window;

                Some(Arc::new(move |at| {
                    let since_prev = elapsed(&TimeRange::point(at), &prev_window);
                    position_at_prev.add(&since_prev.scale(per_sec)).center()
                }))
            }
        }
    }

    /// Position range at `prev`, narrowed by what the anchor predicts.
    fn tightened_position_range(
        &self,
        anchor: &PlaybackAnchor,
        prev: &StatusSample,
        length: f64,
    ) -> Range {
        let predicted = anchor
            .playback_time
            .add(&elapsed(&prev.window, &anchor.window).scale(anchor.rate));
        let reported = self
            .clock
            .playback_time_range(prev.playback_time_secs(), prev.rate);
        predicted
            .intersection(&reported)
            .unwrap_or(reported)
            .div(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::time::{Duration, Instant};

    fn at(t0: Instant, offset_ms: u64, width_ms: u64) -> TimeRange {
        let start = t0 + Duration::from_millis(offset_ms);
        TimeRange::new(start, start + Duration::from_millis(width_ms))
    }

    fn sample(window: TimeRange, state: PlaybackState, position: f64) -> StatusSample {
        StatusSample {
            window,
            length_secs: 100,
            rate: 1.0,
            state,
            position,
            file_name: "movie.mp4".to_string(),
            file_uri: "file:///movie.mp4".to_string(),
        }
    }

    fn playing(window: TimeRange, position: f64) -> StatusSample {
        sample(window, PlaybackState::Playing, position)
    }

    /// State past the open of `file:///movie.mp4`, whose window ends at `t0`.
    fn opened(t0: Instant) -> InstanceState {
        let state = InstanceState::default();
        state.apply_new_status(&playing(at(t0, 0, 0), 0.0));
        state
    }

    #[test]
    fn test_first_observation_pushes_everything() {
        let state = InstanceState::default();
        let t0 = Instant::now();

        let update = state.get_update(&playing(at(t0, 0, 10), 0.2)).unwrap();
        assert!(!update.is_natural);
        assert_eq!(update.changed, ChangedFields::all());

        let mut empty = playing(at(t0, 0, 10), 0.0);
        empty.file_uri.clear();
        let update = state.get_update(&empty).unwrap();
        assert!(update.changed.is_empty());
    }

    #[test]
    fn test_stopped_first_observation_pushes_nothing() {
        let state = InstanceState::default();
        let t0 = Instant::now();

        let stopped = sample(at(t0, 0, 10), PlaybackState::Stopped, 0.0);
        let update = state.apply_new_status_and_get_update(&stopped).unwrap();
        assert!(update.changed.is_empty());
        assert!(!update.is_manual());

        let update = state
            .get_update(&sample(at(t0, 100, 10), PlaybackState::Stopped, 0.0))
            .unwrap();
        assert!(update.changed.is_empty());
    }

    #[test]
    fn test_sample_after_file_change_pushes_playback() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        let on = |file: &str, window: TimeRange, position: f64| StatusSample {
            file_uri: format!("file:///{file}"),
            ..playing(window, position)
        };
        state.apply_new_status(&on("a.mp4", at(t0, 0, 10), 0.5));
        state.apply_new_status(&on("a.mp4", at(t0, 100, 10), 0.5));
        assert!(state.anchor().is_some());

        let update = state
            .apply_new_status_and_get_update(&on("b.mp4", at(t0, 1_000, 10), 0.0))
            .unwrap();
        assert_eq!(update.changed, ChangedFields::FILE_URI);
        assert!(state.anchor().is_none());

        let update = state
            .apply_new_status_and_get_update(&on("b.mp4", at(t0, 2_000, 10), 0.01))
            .unwrap();
        assert!(!update.is_natural);
        assert_eq!(
            update.changed,
            ChangedFields::POSITION | ChangedFields::RATE | ChangedFields::STATE
        );
        assert_eq!(state.anchor().unwrap().position, 0.01);

        let update = state
            .get_update(&on("b.mp4", at(t0, 2_500, 10), 0.015))
            .unwrap();
        assert!(update.is_natural);
        assert_eq!(update.changed, ChangedFields::POSITION);
    }

    #[test]
    fn test_stale_sample_is_rejected_without_mutation() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        let applied = playing(at(t0, 100, 100), 0.2);
        state.apply_new_status(&applied);

        let stale = playing(at(t0, 150, 10), 0.9);
        assert!(matches!(state.get_update(&stale), Err(SyncError::StaleSample)));
        assert!(matches!(
            state.apply_new_status_and_get_update(&stale),
            Err(SyncError::StaleSample)
        ));
        state.apply_new_status(&stale);
        assert_eq!(state.last_sample(), Some(applied));
    }

    #[test]
    fn test_ordered_samples_are_never_stale() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        for i in 0..20u64 {
            let window = at(t0, i * 100, 100);
            assert!(state
                .apply_new_status_and_get_update(&playing(window, 0.1 + i as f64 * 0.001))
                .is_ok());
        }
    }

    #[test]
    fn test_natural_playback_is_natural() {
        let t0 = Instant::now();
        let state = opened(t0);
        state.apply_new_status(&playing(at(t0, 0, 0), 0.10));

        let update = state.get_update(&playing(at(t0, 500, 20), 0.105)).unwrap();
        assert!(update.is_natural);
        assert_eq!(update.changed, ChangedFields::POSITION);
        assert!(!update.is_manual());
    }

    #[test]
    fn test_seek_is_manual() {
        let t0 = Instant::now();
        let state = opened(t0);
        state.apply_new_status(&playing(at(t0, 0, 0), 0.10));

        let update = state.get_update(&playing(at(t0, 500, 20), 0.50)).unwrap();
        assert!(!update.is_natural);
        assert!(update.changed.contains(ChangedFields::POSITION));
    }

    #[test]
    fn test_file_change_is_never_natural() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        state.apply_new_status(&playing(at(t0, 0, 0), 0.10));

        let mut other = playing(at(t0, 500, 20), 0.105);
        other.file_uri = "file:///other.mp4".to_string();
        let update = state.get_update(&other).unwrap();
        assert!(!update.is_natural);
        assert!(update.changed.contains(ChangedFields::FILE_URI));
    }

    #[test]
    fn test_same_path_under_other_scheme_is_same_file() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        let mut first = playing(at(t0, 0, 0), 0.10);
        first.file_uri = "http://nas/movies/a.mkv".to_string();
        state.apply_new_status(&first);

        let mut second = playing(at(t0, 500, 20), 0.105);
        second.file_uri = "https://nas/movies/a.mkv".to_string();
        let update = state.get_update(&second).unwrap();
        assert!(!update.changed.contains(ChangedFields::FILE_URI));
    }

    #[test]
    fn test_resume_changes_only_state() {
        let t0 = Instant::now();
        let state = opened(t0);
        state.apply_new_status(&sample(at(t0, 0, 10), PlaybackState::Paused, 0.3));
        assert!(state.anchor().is_none());

        let update = state
            .apply_new_status_and_get_update(&playing(at(t0, 100, 10), 0.3))
            .unwrap();
        assert_eq!(update.changed, ChangedFields::STATE);
        assert!(!update.is_natural);
        assert!(state.anchor().is_some());
    }

    #[test]
    fn test_anchor_follows_position() {
        let t0 = Instant::now();
        let state = opened(t0);
        assert!(state.anchor().is_none());
        state.apply_new_status(&playing(at(t0, 0, 10), 0.10));
        let first = state.anchor().unwrap();

        state.apply_new_status(&playing(at(t0, 100, 10), 0.10));
        assert_eq!(state.anchor().unwrap(), first);

        state.apply_new_status(&playing(at(t0, 600, 10), 0.105));
        assert_eq!(state.anchor().unwrap().position, 0.105);

        state.apply_new_status(&sample(at(t0, 700, 10), PlaybackState::Stopped, 0.0));
        assert!(state.anchor().is_none());
    }

    #[test]
    fn test_differing_fields_ignore_sample_order() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        let source = playing(at(t0, 0, 10), 0.4);
        assert_eq!(
            state.differing_fields(&source),
            ChangedFields::FILE_URI | ChangedFields::RATE | ChangedFields::STATE
        );

        state.apply_new_status(&sample(at(t0, 100, 10), PlaybackState::Paused, 0.2));
        assert_eq!(state.differing_fields(&source), ChangedFields::STATE);
        assert!(state.get_update(&source).is_err());

        let faster = StatusSample {
            rate: 2.0,
            ..sample(at(t0, 200, 10), PlaybackState::Paused, 0.9)
        };
        assert_eq!(state.differing_fields(&faster), ChangedFields::RATE);

        let other = StatusSample {
            file_uri: "file:///other.mp4".to_string(),
            ..faster
        };
        assert_eq!(state.differing_fields(&other), ChangedFields::FILE_URI);
    }

    #[test]
    fn test_sync_commands_only_carry_requested_fields() {
        let state = InstanceState::default();
        assert!(state.get_sync_commands(ChangedFields::all()).is_empty());

        let t0 = Instant::now();
        state.apply_new_status(&playing(at(t0, 0, 10), 0.4));

        let only_state = state.get_sync_commands(ChangedFields::STATE);
        assert_eq!(only_state.state, Some(PlaybackState::Playing));
        assert!(only_state.open_file.is_none());
        assert!(only_state.seek.is_none());
        assert!(only_state.rate.is_none());

        let file_and_rate = state.get_sync_commands(ChangedFields::FILE_URI | ChangedFields::RATE);
        assert_eq!(file_and_rate.open_file.as_deref(), Some("file:///movie.mp4"));
        assert_eq!(file_and_rate.rate, Some(1.0));
        assert!(file_and_rate.seek.is_none());
        assert!(file_and_rate.state.is_none());

        let position = state.get_sync_commands(ChangedFields::POSITION);
        assert!(position.seek.is_some());
        assert!(position.state.is_none());
    }

    #[test]
    fn test_expected_position_while_paused_is_constant() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        state.apply_new_status(&sample(at(t0, 0, 10), PlaybackState::Paused, 0.3));

        let getter = state.get_expected_position().unwrap();
        let now = getter(t0);
        let later = getter(t0 + Duration::from_secs(30));
        assert_eq!(now, later);
        assert!((now - 0.305).abs() < 1e-9);
    }

    #[test]
    fn test_expected_position_while_playing_extrapolates() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        state.apply_new_status(&playing(at(t0, 0, 0), 0.10));

        let getter = state.get_expected_position().unwrap();
        assert!((getter(t0) - 0.105).abs() < 1e-9);
        assert!((getter(t0 + Duration::from_secs(10)) - 0.205).abs() < 1e-9);
    }

    #[test]
    fn test_stopped_has_no_expected_position() {
        let state = InstanceState::default();
        assert!(state.get_expected_position().is_none());

        let t0 = Instant::now();
        state.apply_new_status(&sample(at(t0, 0, 10), PlaybackState::Stopped, 0.0));
        assert!(state.get_expected_position().is_none());
        assert!(state.get_pause_or_resume_commands().is_empty());
    }

    #[test]
    fn test_pause_or_resume_toggles_state() {
        let state = InstanceState::default();
        let t0 = Instant::now();
        state.apply_new_status(&playing(at(t0, 0, 10), 0.4));

        let commands = state.get_pause_or_resume_commands();
        assert_eq!(commands.state, Some(PlaybackState::Paused));
        assert!(commands.seek.is_some());

        state.apply_new_status(&sample(at(t0, 100, 10), PlaybackState::Paused, 0.4));
        assert_eq!(
            state.get_pause_or_resume_commands().state,
            Some(PlaybackState::Playing)
        );
    }
}
