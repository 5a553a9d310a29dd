//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the playback synchronizer:
//! - Logging and tracing infrastructure
//! - Live settings and timing configuration
//! - Observable values
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine depends on. It
//! establishes the logging conventions, the way settings changes reach running
//! components, and the event broadcasting used to surface what the engine does.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod observable;

pub use config::{SettingsPatch, SettingsSnapshot, SyncSettings, SyncTimings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, InstanceEvent, SyncEvent};
pub use observable::{Observable, Subscription, Value};
