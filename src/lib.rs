//! Workspace umbrella crate.
//!
//! Host applications can depend on `playsync-workspace` and reach the service
//! facade without wiring each workspace crate individually.

pub use core_service::*;
