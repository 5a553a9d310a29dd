//! # Playback Sync Engine
//!
//! Keeps several running player instances on the same file, play state,
//! rate and position.
//!
//! ## Overview
//!
//! Each instance is polled for its status. Changes are classified as
//! natural playback progress or manual user actions, and manual actions on
//! one instance are replayed on the others.
//!
//! ## Components
//!
//! - **Range arithmetic** (`range`): interval math over positions and times
//! - **Playback Clock** (`clock`): natural-vs-manual classification
//! - **Instance State** (`instance_state`): last known status, anchor, sync commands
//! - **Player** (`player`): poll loop and command dispatch for one instance
//! - **Player Set** (`player_set`): supervised group of players
//! - **Syncer** (`syncer`): arbitration, sync rounds and position convergence

pub mod changed_fields;
pub mod clock;
pub mod error;
pub mod instance_state;
pub mod player;
pub mod player_set;
pub mod range;
pub mod repeat;
pub mod syncer;
pub mod update;
pub mod url;

pub use changed_fields::ChangedFields;
pub use clock::{PlaybackAnchor, PlaybackClock};
pub use error::{Result, SyncError};
pub use instance_state::InstanceState;
pub use player::{Player, PlayerObserver};
pub use player_set::PlayerSet;
pub use range::Range;
pub use repeat::RepeatRule;
pub use syncer::{fields_to_push, Arbitration, Syncer};
pub use update::Update;
