//! Command groups pushed to followers.
//!
//! A [`CommandGroup`] bundles up to four independent changes. The seek target
//! is not a number but an [`ExpectedPositionGetter`], evaluated by the wire
//! client at the moment it expects the command to execute, so the position
//! stays correct no matter how long the group waited in a retry loop.

use crate::status::PlaybackState;
use core_async::time::Instant;
use std::fmt;
use std::sync::Arc;

/// Computes the position a player should be at, at the given instant.
pub type ExpectedPositionGetter = Arc<dyn Fn(Instant) -> f64 + Send + Sync>;

/// Optional open-file, seek, rate and state changes.
///
/// Members left as `None` are not touched on the target player.
#[derive(Clone, Default)]
pub struct CommandGroup {
    pub open_file: Option<String>,
    pub seek: Option<ExpectedPositionGetter>,
    pub rate: Option<f64>,
    pub state: Option<PlaybackState>,
}

impl CommandGroup {
    /// Group containing only a seek.
    pub fn seek_only(getter: ExpectedPositionGetter) -> Self {
        Self {
            seek: Some(getter),
            ..Self::default()
        }
    }

    /// Group containing only an open-file request.
    pub fn open_file(uri: impl Into<String>) -> Self {
        Self {
            open_file: Some(uri.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open_file.is_none() && self.seek.is_none() && self.rate.is_none() && self.state.is_none()
    }

    /// Copy of this group with the seek removed.
    pub fn without_seek(&self) -> Self {
        Self {
            seek: None,
            ..self.clone()
        }
    }

    /// Seek target evaluated at `at`, if the group carries a seek.
    pub fn seek_target(&self, at: Instant) -> Option<f64> {
        self.seek.as_ref().map(|getter| getter(at))
    }

    fn targets_stopped(&self) -> bool {
        self.state == Some(PlaybackState::Stopped)
    }

    /// Lowers the group into primitive wire commands.
    ///
    /// The open-file command always comes first and must be confirmed before
    /// the rest are sent. Open, seek and rate are dropped when the group stops
    /// the player. The seek getter is evaluated at `execution_time`.
    pub fn to_wire_commands(&self, execution_time: Instant) -> Vec<WireCommand> {
        let mut commands = Vec::with_capacity(4);
        let not_stopped = !self.targets_stopped();

        if not_stopped {
            if let Some(uri) = &self.open_file {
                commands.push(WireCommand::PlayFile(uri.clone()));
            }
            if let Some(position) = self.seek_target(execution_time) {
                commands.push(WireCommand::Seek(position));
            }
            if let Some(rate) = self.rate {
                commands.push(WireCommand::Rate(rate));
            }
        }

        match self.state {
            Some(PlaybackState::Playing) => commands.push(WireCommand::Resume),
            Some(PlaybackState::Paused) => commands.push(WireCommand::Pause),
            Some(PlaybackState::Stopped) => commands.push(WireCommand::Stop),
            None => {}
        }

        commands
    }
}

impl fmt::Debug for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGroup")
            .field("open_file", &self.open_file)
            .field("seek", &self.seek.as_ref().map(|_| "<getter>"))
            .field("rate", &self.rate)
            .field("state", &self.state)
            .finish()
    }
}

/// Primitive command understood by the player's control interface.
#[derive(Debug, Clone, PartialEq)]
pub enum WireCommand {
    PlayFile(String),
    /// Normalized position in `[0, 1]`.
    Seek(f64),
    Rate(f64),
    Resume,
    Pause,
    Stop,
}
