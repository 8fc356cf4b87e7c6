//! Listener registries with disposable subscriptions

use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Shared callback invoked with each emitted event
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Releases whatever it guards (a listener, a timer task) exactly once:
/// on `dispose()` or on drop, whichever comes first.
#[must_use = "dropping a Subscription releases it immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Subscription that guards nothing
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Aborts the task when released
    pub fn for_task(handle: tokio::task::JoinHandle<()>) -> Self {
        Self::new(move || handle.abort())
    }

    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Ordered set of handlers for one event type
pub struct Listeners<E> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler<E>)>>,
}

impl<E: 'static> Listeners<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register `handler`; it stays registered until the returned
    /// subscription is released.
    pub fn subscribe(self: &Arc<Self>, handler: Handler<E>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, handler));

        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.handlers.lock().retain(|(existing, _)| *existing != id);
            }
        })
    }

    /// Call every handler. Handlers run outside the lock, so they may
    /// subscribe or unsubscribe.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}
