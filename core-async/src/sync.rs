//! Synchronization primitives.
//!
//! Async-aware locks and channels come from `tokio::sync`; cooperative
//! shutdown uses `tokio_util`'s [`CancellationToken`], which every long-running
//! loop in the engine accepts and checks between steps.
//!
//! Short critical sections that never cross an `.await` should prefer
//! `parking_lot` locks instead of the async ones exported here.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let parent = CancellationToken::new();
//!     let child = parent.child_token();
//!     parent.cancel();
//!     assert!(child.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
