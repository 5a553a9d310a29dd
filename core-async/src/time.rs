//! Time-related abstractions.
//!
//! Timers are tokio's; `Instant` is the std monotonic clock, which is the only
//! clock the synchronizer reasons about.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(10)).await;
//!     println!("Took {:?}", start.elapsed());
//! }
//! ```

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant};

use crate::sync::CancellationToken;

/// Returned by [`sleep_cancellable`] when the token fired before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Sleeps for `duration` unless `token` is cancelled first.
///
/// A zero duration still observes an already-cancelled token.
pub async fn sleep_cancellable(
    token: &CancellationToken,
    duration: Duration,
) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        _ = token.cancelled() => Err(Cancelled),
        _ = sleep(duration) => Ok(()),
    }
}

/// Sleeps until `deadline` unless `token` is cancelled first.
///
/// Deadlines in the past return immediately.
pub async fn sleep_until_cancellable(
    token: &CancellationToken,
    deadline: Instant,
) -> Result<(), Cancelled> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    sleep_cancellable(token, remaining).await
}
