//! # Host Bridge Traits
//!
//! Contracts between the playback synchronizer and the collaborators a host
//! application must provide.
//!
//! ## Overview
//!
//! The synchronization engine (`core-sync`) only reasons about status samples
//! and command groups. Everything that touches the outside world lives behind
//! the traits in this crate:
//!
//! - [`InstanceLauncher`](instance::InstanceLauncher) - Starts a player process
//! - [`InstanceHandle`](instance::InstanceHandle) - Lifecycle of one running player
//! - [`PlayerClient`](instance::PlayerClient) - Status queries and command groups over the player's control interface
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Data Types
//!
//! - [`StatusSample`](status::StatusSample) - One observation, stamped with its round-trip window
//! - [`CommandGroup`](command::CommandGroup) - Optional open-file/seek/rate/state changes
//! - [`WireCommand`](command::WireCommand) - Primitive commands a group lowers into
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! classify their own errors through
//! [`PlayerClient::is_recoverable_err`](instance::PlayerClient::is_recoverable_err);
//! the engine retries recoverable ones and stops on the rest.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared across the
//! per-player polling tasks.

pub mod command;
pub mod error;
pub mod instance;
pub mod logging;
pub mod status;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use command::{CommandGroup, ExpectedPositionGetter, WireCommand};
pub use instance::{
    InstanceHandle, InstanceId, InstanceLauncher, LaunchOptions, PlayerClient, StderrEvent,
    StderrEventHandler,
};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use status::{PlaybackState, StatusSample, TimeRange};
