//! Single-flight memoization: concurrent callers share one in-progress result.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;

/// Runs at most one instance of an async operation at a time.
///
/// The first caller launches the operation; callers arriving while it is in
/// flight await the same shared future and receive a clone of its output.
/// The slot is cleared once the operation completes, so the next call starts
/// fresh.
pub struct SingleFlight<T: Clone> {
    inflight: Mutex<Option<Shared<BoxFuture<'static, T>>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }

    /// Join the in-flight operation, or launch `start()` if there is none.
    pub async fn run<F, Fut>(&self, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut slot = self.inflight.lock();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let launched = start().boxed().shared();
                    *slot = Some(launched.clone());
                    launched
                }
            }
        };

        let output = shared.clone().await;

        // Whoever observes completion first clears the slot, but only if it
        // still holds this very operation.
        let mut slot = self.inflight.lock();
        if slot
            .as_ref()
            .is_some_and(|current| Shared::ptr_eq(current, &shared))
        {
            *slot = None;
        }

        output
    }

    pub fn is_in_flight(&self) -> bool {
        self.inflight.lock().is_some()
    }

    /// Forget the in-flight operation. Callers already awaiting it still get
    /// its result; new callers start a fresh one.
    pub fn forget(&self) {
        self.inflight.lock().take();
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
