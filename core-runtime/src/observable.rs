//! # Observable Values
//!
//! Live settings and shared engine state that other components react to.
//!
//! ## Overview
//!
//! A [`Value`] holds the current value behind a `parking_lot` lock and keeps a
//! list of subscriber callbacks. `set` replaces the value and then calls every
//! subscriber outside the lock, so callbacks may freely read the value,
//! subscribe again, or drop their own subscription.
//!
//! [`Value::subscribe`] returns a [`Subscription`]; the callback stays
//! registered exactly as long as the subscription is alive.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::observable::{Observable, Value};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let instances = Value::new(2usize);
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let seen_by_callback = Arc::clone(&seen);
//! let subscription = instances.subscribe(move |n| {
//!     seen_by_callback.store(*n, Ordering::SeqCst);
//! });
//!
//! instances.set(3);
//! assert_eq!(seen.load(Ordering::SeqCst), 3);
//!
//! drop(subscription);
//! instances.set(4);
//! assert_eq!(seen.load(Ordering::SeqCst), 3);
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Read access plus change notification.
pub trait Observable<T>: Send + Sync {
    fn get(&self) -> T;

    /// Registers `callback` to run after every change.
    fn subscribe(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> Subscription;
}

/// Handle that keeps a callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribes now rather than on drop.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

struct Inner<T> {
    value: RwLock<T>,
    subscribers: Mutex<BTreeMap<u64, Callback<T>>>,
    next_id: AtomicU64,
}

/// Shared, observable value. Clones refer to the same value.
pub struct Value<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replaces the value and notifies subscribers in registration order.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value.clone();

        let callbacks: Vec<Callback<T>> = self.inner.subscribers.lock().values().cloned().collect();
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Sets the value only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if *self.inner.value.read() == value {
            return false;
        }
        self.set(value);
        true
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().insert(id, Arc::new(callback));

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().remove(&id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl<T> Observable<T> for Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Value::get(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        Value::subscribe(self, callback)
    }
}

impl<T> Default for Value<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&*self.inner.value.read()).finish()
    }
}
