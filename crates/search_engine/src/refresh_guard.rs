//! Single-flight guard for background cache refreshes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Allows at most one detached refresh task at a time.
///
/// The task's outcome is never reported back to the caller of
/// [`trigger`](Self::trigger); wrap the work so its failures are logged.
#[derive(Debug, Clone, Default)]
pub struct RefreshGuard {
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the task finishes, including on panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `refresh` unless one is already running.
    ///
    /// Returns `true` if the task was started, `false` if another refresh
    /// was in flight. Must be called from within a Tokio runtime.
    pub fn trigger<F>(&self, refresh: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let marker = InFlight(Arc::clone(&self.in_flight));
        tokio::spawn(async move {
            let _marker = marker;
            refresh.await;
        });

        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
