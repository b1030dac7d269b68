//! Observer registries for sensor snapshots and magnet changes.
//!
//! Observers are invoked synchronously in registration order on the task that
//! produced the value. A panicking observer is logged and skipped; the other
//! observers and the producing task keep running.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

/// Identifies one registration; used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(ObserverId, Callback<T>)>,
}

/// Ordered, shareable list of callbacks.
pub struct Observers<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<T> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").field("len", &self.len()).finish()
    }
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ObserverId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(callback)));
        id
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.entries.len();
        registry.entries.retain(|(entry, _)| *entry != id);
        registry.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every observer with `value`.
    pub fn notify(&self, value: &T) {
        // Snapshot the list so callbacks may (un)register without deadlocking.
        let callbacks: Vec<Callback<T>> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                warn!("Observer panicked, continuing with the next one");
            }
        }
    }
}
