//! Run-wide abort signal
//!
//! One signal is shared by a whole run. Triggering it terminates every
//! currently running step executor and makes the runner skip nodes that
//! have not started yet. Sources: operator cancellation and quality-gate
//! timeout escalation.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cheaply clonable cancellation handle
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

impl AbortSignal {
    /// Creates an untriggered signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the abort.
    ///
    /// Only the first trigger's reason is kept; later calls are no-ops.
    pub fn trigger(&self, reason: impl Into<String>) {
        if !self.inner.triggered.swap(true, Ordering::SeqCst) {
            *self.inner.reason.lock() = Some(reason.into());
        }
        self.inner.notify.notify_waiters();
    }

    /// Returns true once the signal has been triggered
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// The reason given by the first trigger, if any
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    /// Waits until the signal is triggered.
    ///
    /// Returns immediately if it already was.
    pub async fn cancelled(&self) {
        while !self.is_triggered() {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register with the Notify before re-checking the flag;
            // notify_waiters only wakes already-registered waiters, so
            // checking first would leave a window where a trigger
            // between the check and the await is lost.
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
