//! Latest-value broadcast with synchronous observers.
//!
//! A [`Subject`] holds one value and a list of observer callbacks. Publishing
//! replaces the value and then calls every observer in registration order.
//! New subscribers are called immediately with the current value.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: T,
    observers: Vec<(u64, Observer<T>)>,
    next_id: u64,
}

pub struct Subject<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    // A panic inside an update closure must not wedge later publishes
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value: initial,
                observers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Clone of the latest value
    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Replaces the value and notifies every observer
    pub fn publish(&self, value: T) {
        let (value, observers) = {
            let mut inner = lock(&self.inner);
            inner.value = value;
            (inner.value.clone(), Self::snapshot_observers(&inner))
        };

        // Observers run outside the lock so they can read the subject
        for observer in observers {
            observer(&value);
        }
    }

    /// Publishes `value` only if `predicate` holds for the current value
    ///
    /// The check and the replacement happen under one lock acquisition.
    pub fn publish_if(&self, predicate: impl FnOnce(&T) -> bool, value: T) -> bool {
        let (value, observers) = {
            let mut inner = lock(&self.inner);
            if !predicate(&inner.value) {
                return false;
            }
            inner.value = value;
            (inner.value.clone(), Self::snapshot_observers(&inner))
        };

        for observer in observers {
            observer(&value);
        }
        true
    }

    /// Applies `update` to the value in place and notifies observers
    ///
    /// The closure runs under the lock and must not touch the subject itself.
    pub fn update<R>(&self, update: impl FnOnce(&mut T) -> R) -> R {
        let (result, value, observers) = {
            let mut inner = lock(&self.inner);
            let result = update(&mut inner.value);
            (result, inner.value.clone(), Self::snapshot_observers(&inner))
        };

        for observer in observers {
            observer(&value);
        }
        result
    }

    /// Like [`update`](Self::update), but observers are only notified when
    /// the closure returns `Some`, so a no-op edit stays silent
    pub fn update_if<R>(&self, update: impl FnOnce(&mut T) -> Option<R>) -> Option<R> {
        let (result, value, observers) = {
            let mut inner = lock(&self.inner);
            let result = update(&mut inner.value)?;
            (result, inner.value.clone(), Self::snapshot_observers(&inner))
        };

        for observer in observers {
            observer(&value);
        }
        Some(result)
    }

    /// Registers an observer and immediately replays the current value to it
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let observer: Observer<T> = Arc::new(observer);

        let (id, current) = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.observers.push((id, Arc::clone(&observer)));
            (id, inner.value.clone())
        };

        observer(&current);

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).observers.retain(|(registered, _)| *registered != id);
            }
        })
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    fn snapshot_observers(inner: &Inner<T>) -> Vec<Observer<T>> {
        inner
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

/// Handle returned by [`Subject::subscribe`]
///
/// Dropping the handle unsubscribes. Keep it alive for as long as delivery
/// is wanted.
pub struct Subscription {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// Stops further delivery. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(detach) = detach {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
