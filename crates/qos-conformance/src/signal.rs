//! One-shot wakeup fired by the first delivered message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Fired,
    TimedOut,
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

/// Fires at most once. Clones share the same slot.
///
/// Anything written before [`fire`](Self::fire) is visible to a waiter that
/// observes [`WaitOutcome::Fired`].
#[derive(Debug, Clone, Default)]
pub struct DeliverySignal {
    inner: Arc<Inner>,
}

impl DeliverySignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually fired the signal.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        // notify_one stores a permit when nobody is waiting yet
        self.inner.notify.notify_one();
        true
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    pub async fn wait(&self, timeout: Duration) -> WaitOutcome {
        if self.is_fired() {
            return WaitOutcome::Fired;
        }
        match tokio::time::timeout(timeout, self.inner.notify.notified()).await {
            Ok(()) => WaitOutcome::Fired,
            Err(_) if self.is_fired() => WaitOutcome::Fired,
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}
