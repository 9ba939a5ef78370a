//! Revocable callback subscriptions
//!
//! Replaces a single overwritable callback slot with an explicit list.
//! `subscribe` hands back a [`Subscription`]; revoking or dropping it removes
//! the callback. Callbacks run outside the list lock, so a callback may
//! subscribe or revoke without deadlocking.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

struct Entries<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// Ordered list of callbacks for values of type `T`
pub struct Subscribers<T> {
    inner: Arc<Mutex<Entries<T>>>,
}

impl<T> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Entries { next_id: 1, callbacks: Vec::new() })) }
    }

    /// Add a callback; it stays registered while the returned handle lives
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut entries = self.inner.lock();
            let id = entries.next_id;
            entries.next_id += 1;
            entries.callbacks.push((id, Arc::new(callback)));
            id
        };
        debug!(subscription_id = id, "subscriber_added");

        let weak: Weak<Mutex<Entries<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            revoke: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().callbacks.retain(|(cb_id, _)| *cb_id != id);
                    debug!(subscription_id = id, "subscriber_removed");
                }
            })),
        }
    }

    /// Invoke every live callback with `value`, returning how many ran
    pub fn notify(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> =
            self.inner.lock().callbacks.iter().map(|(_, cb)| cb.clone()).collect();
        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().callbacks.is_empty()
    }
}

/// Capability to stay subscribed
///
/// Dropping the handle unsubscribes. Call [`detach`](Subscription::detach)
/// to keep the callback for the lifetime of the subscriber list.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    revoke: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback now
    pub fn revoke(mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }

    /// Keep the callback registered without holding the handle
    pub fn detach(mut self) {
        self.revoke = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.revoke.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&u32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move |_: &u32| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let subscribers = Subscribers::<u32>::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let _sa = subscribers.subscribe(cb_a);
        let _sb = subscribers.subscribe(cb_b);

        assert_eq!(subscribers.notify(&7), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_revoke_removes_only_that_subscriber() {
        let subscribers = Subscribers::<u32>::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let sa = subscribers.subscribe(cb_a);
        let _sb = subscribers.subscribe(cb_b);

        sa.revoke();
        subscribers.notify(&1);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(subscribers.len(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subscribers = Subscribers::<u32>::new();
        let (count, cb) = counter();
        {
            let _sub = subscribers.subscribe(cb);
            assert_eq!(subscribers.len(), 1);
        }

        assert!(subscribers.is_empty());
        assert_eq!(subscribers.notify(&1), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detach_keeps_subscriber() {
        let subscribers = Subscribers::<u32>::new();
        let (count, cb) = counter();

        subscribers.subscribe(cb).detach();
        subscribers.notify(&1);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_revoke_after_list_dropped() {
        let subscribers = Subscribers::<u32>::new();
        let (_count, cb) = counter();
        let sub = subscribers.subscribe(cb);

        drop(subscribers);
        sub.revoke();
    }
}
