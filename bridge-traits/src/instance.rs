//! Player instance contracts.
//!
//! The engine never spawns processes or speaks HTTP itself. The host provides:
//!
//! - an [`InstanceLauncher`] that starts a player process and returns a handle
//!   once its control interface answers,
//! - an [`InstanceHandle`] per running process, which is also its
//!   [`PlayerClient`] for status queries and commands.
//!
//! Futures returned by these traits may be dropped at any await point; that is
//! how the engine abandons an in-flight request on shutdown.

use crate::command::CommandGroup;
use crate::error::{BridgeError, Result};
use crate::status::StatusSample;
use async_trait::async_trait;
use core_async::sync::CancellationToken;
use std::sync::Arc;

/// Identifier of a player instance, unique for the lifetime of a session.
pub type InstanceId = u32;

/// Events parsed from a player's diagnostic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StderrEvent {
    /// Primary mouse button pressed and released inside the video surface.
    Mouse1Click,
}

/// Callback receiving parsed stderr events.
pub type StderrEventHandler = Box<dyn Fn(StderrEvent) + Send + Sync>;

/// Options passed to [`InstanceLauncher::launch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub id: InstanceId,
    /// File to open right away, if one is already known.
    pub file_uri: Option<String>,
    pub no_video: bool,
}

/// Status and command interface of one player.
#[async_trait]
pub trait PlayerClient: Send + Sync {
    /// Fetches the current status, including the resolved file URI.
    async fn get_status_ex(&self) -> Result<StatusSample>;

    /// Sends a command group and returns the status observed after it.
    ///
    /// The open-file member, if any, must be confirmed before the remaining
    /// members are sent. See [`CommandGroup::to_wire_commands`].
    async fn send_cmd_group(&self, group: &CommandGroup) -> Result<StatusSample>;

    /// Whether `err` is transient (connection refused, timeout, malformed
    /// response while the player starts up) and worth retrying.
    fn is_recoverable_err(&self, err: &BridgeError) -> bool;
}

/// A running player process.
#[async_trait]
pub trait InstanceHandle: PlayerClient {
    fn id(&self) -> InstanceId;

    fn is_running(&self) -> bool;

    /// Asks the process to exit.
    fn stop(&self) -> Result<()>;

    /// Enables or disables click detection on the stderr parser.
    fn set_click_detection(&self, _enabled: bool) {}

    /// Blocks until the process exits or `token` is cancelled.
    ///
    /// Resolves with `Ok(())` after stopping the process on cancellation, with
    /// [`BridgeError::InstanceFinished`] when the process exited on its own and
    /// with [`BridgeError::InstanceFailed`] when it exited with a fault.
    /// Parsed stderr events are delivered to `on_event` while waiting.
    async fn wait(&self, token: CancellationToken, on_event: StderrEventHandler) -> Result<()>;

    /// Resolves once the process has exited, for whatever reason.
    async fn finished(&self);
}

/// Starts player processes.
#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    /// Launches an instance and returns once its control interface answers.
    ///
    /// If the returned future is dropped mid-launch the launcher is
    /// responsible for killing the half-started process.
    async fn launch(&self, options: LaunchOptions) -> Result<Arc<dyn InstanceHandle>>;
}
