//! One-to-many notification between engine objects.
//!
//! Observables keep weak back-references only: an observer never owns
//! the thing it watches, and dropping the observer detaches it.

use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Event kinds delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Event {
    Done,
    Connected,
    Disconnected,
    ValueChanged,
}

/// Something that wants to hear about engine events.
pub trait Observer: Send + Sync {
    fn update(&self, event: Event);
}

/// Holder of observer back-references.
///
/// Notification is synchronous and runs on the thread that performed
/// the mutating operation.
#[derive(Default)]
pub struct Observable {
    observers: Mutex<Vec<Weak<dyn Observer>>>,
}

impl Observable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Only a weak reference is kept.
    pub fn attach<O: Observer + 'static>(&self, observer: &Arc<O>) {
        let observer: Arc<dyn Observer> = observer.clone();
        let weak: Weak<dyn Observer> = Arc::downgrade(&observer);
        self.lock().push(weak);
    }

    /// Remove an observer registered with [`attach`](Self::attach).
    pub fn detach<O: Observer + 'static>(&self, observer: &Arc<O>) {
        let target = Arc::as_ptr(observer) as *const ();
        self.lock()
            .retain(|w| w.as_ptr() as *const () != target && w.strong_count() > 0);
    }

    /// Invoke `update(event)` on every live observer, pruning dead ones.
    pub fn notify(&self, event: Event) {
        let live: Vec<Arc<dyn Observer>> = {
            let mut observers = self.lock();
            observers.retain(|w| w.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        // Observers run with the registry lock released so they may
        // attach or detach from inside `update`.
        for observer in live {
            observer.update(event);
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        let mut observers = self.lock();
        observers.retain(|w| w.strong_count() > 0);
        observers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<dyn Observer>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.observer_count())
            .finish()
    }
}
