//! Tracking of saves still running after their event was handled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Counts in-flight saves and wakes waiters when the count drops to zero.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the in-flight count when dropped.
pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// Url keys with a capture currently in flight.
#[derive(Debug, Default)]
pub(crate) struct ActiveKeys {
    keys: Mutex<HashSet<String>>,
}

impl ActiveKeys {
    /// Claims `key`, or returns `None` if another capture holds it.
    pub(crate) fn claim(self: &Arc<Self>, key: &str) -> Option<KeyClaim> {
        let inserted = self
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
        inserted.then(|| KeyClaim {
            keys: Arc::clone(self),
            key: key.to_string(),
        })
    }
}

/// Releases a claimed key when dropped.
pub(crate) struct KeyClaim {
    keys: Arc<ActiveKeys>,
    key: String,
}

impl Drop for KeyClaim {
    fn drop(&mut self) {
        self.keys
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
