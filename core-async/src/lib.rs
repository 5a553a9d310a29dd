//! Async runtime facade for the playback synchronizer.
//!
//! Every engine crate depends on this crate instead of reaching for tokio
//! directly, so the executor, timers and cancellation plumbing have one home.
//!
//! # Modules
//!
//! - `task`: Task spawning
//! - `time`: Sleep, timeouts and cancellable waits
//! - `sync`: Async-aware locks, channels and `CancellationToken`
//! - `runtime`: Blocking entry points used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep_cancellable, Duration};
//!
//! async fn example(token: CancellationToken) {
//!     if sleep_cancellable(&token, Duration::from_millis(100)).await.is_err() {
//!         // shutdown requested while waiting
//!     }
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use sync::CancellationToken;
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
