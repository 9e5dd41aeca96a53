//! Initialization watchdog.
//!
//! A single timer armed when resolution starts and disarmed the instant it
//! completes. If the timer fires first, the on-timeout future runs and the
//! engine forces a terminal error state, so the UI is never left in a
//! perpetual loading state. The bound is supplied per call site: whole-app
//! initialization uses a longer bound than a single protected-route check.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A disarm-on-drop timeout guard.
///
/// Dropping the watchdog (or calling [`disarm`](Self::disarm)) cancels the
/// pending timer; once the timer has fired, disarming is a no-op.
#[derive(Debug)]
pub struct Watchdog {
    handle: JoinHandle<()>,
    bound: Duration,
}

impl Watchdog {
    /// Arms a watchdog that runs `on_timeout` after `bound` elapses.
    #[must_use]
    pub fn arm<F>(bound: Duration, on_timeout: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            on_timeout.await;
        });
        Self { handle, bound }
    }

    /// Cancels the pending timer.
    pub fn disarm(self) {
        debug!(bound_ms = self.bound.as_millis() as u64, "watchdog disarmed");
        // Drop aborts the task.
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
