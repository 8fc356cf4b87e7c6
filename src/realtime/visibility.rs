//! App visibility source
//!
//! Stands in for the browser's page-visibility signal: whoever owns the
//! "foreground" notion calls `set_visibility`, and subscribers hear about
//! actual changes only.

use crate::realtime::listeners::{Handler, Listeners, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

pub struct VisibilityMonitor {
    current: Mutex<Visibility>,
    listeners: Arc<Listeners<Visibility>>,
}

impl VisibilityMonitor {
    pub fn new(initial: Visibility) -> Self {
        Self {
            current: Mutex::new(initial),
            listeners: Arc::new(Listeners::new()),
        }
    }

    pub fn current(&self) -> Visibility {
        *self.current.lock()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        {
            let mut current = self.current.lock();
            if *current == visibility {
                return;
            }
            *current = visibility;
        }
        debug!(?visibility, "Visibility changed");
        self.listeners.emit(&visibility);
    }

    pub fn on_change(&self, handler: Handler<Visibility>) -> Subscription {
        self.listeners.subscribe(handler)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::new(Visibility::Visible)
    }
}
