//! Keyed handler sets shared by the event bus and the message router.

use std::any::Any;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

/// A shared callback. Identity is the allocation, so the same `Arc` can be
/// registered under several keys and removed from each one.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handlers grouped by key, each group kept in registration order with no
/// duplicates.
pub(crate) struct Registry<K, T> {
    handlers: Mutex<HashMap<K, Vec<Handler<T>>>>,
}

fn same_handler<T>(a: &Handler<T>, b: &Handler<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl<K: Eq + Hash, T> Registry<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `handler` under `key`. Returns `false` if it was already there.
    pub(crate) fn add(&self, key: K, handler: Handler<T>) -> bool {
        let mut handlers = self.handlers.lock();
        let group = handlers.entry(key).or_default();
        if group.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        group.push(handler);
        true
    }

    /// Removes `handler` from `key`. Returns `false` if it was not there.
    pub(crate) fn remove<Q>(&self, key: &Q, handler: &Handler<T>) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut handlers = self.handlers.lock();
        let Some(group) = handlers.get_mut(key) else {
            return false;
        };
        let before = group.len();
        group.retain(|h| !same_handler(h, handler));
        let removed = group.len() != before;
        if group.is_empty() {
            handlers.remove(key);
        }
        removed
    }

    pub(crate) fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.handlers.lock().get(key).map_or(0, Vec::len)
    }

    /// Calls every handler registered under `key` with `value`.
    ///
    /// The group is copied before the first call and no lock is held while
    /// handlers run, so a handler may add or remove handlers (including
    /// itself) without affecting this pass. A panicking handler is logged
    /// and skipped. Returns how many handlers ran to completion.
    pub(crate) fn dispatch<Q>(&self, key: &Q, value: &T) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + fmt::Display + ?Sized,
    {
        let snapshot: Vec<Handler<T>> = match self.handlers.lock().get(key) {
            Some(group) => group.clone(),
            None => return 0,
        };

        let mut completed = 0;
        for (index, handler) in snapshot.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    tracing::error!(
                        %key,
                        handler = index,
                        panic = panic_message(payload.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        completed
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl<K, T> fmt::Debug for Registry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("Registry")
            .field("keys", &handlers.len())
            .field("handlers", &handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
