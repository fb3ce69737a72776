//! Process-wide sync status tracker for UI consumption.
//!
//! Internally a pending-operation counter rather than a boolean, because
//! pushes and pulls can overlap (a manual retry in flight while a live
//! listener fires). The tracker knows nothing about what failed, only that
//! something did.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Externally visible sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

#[derive(Default)]
struct Inner {
    pending: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

/// Cheaply clonable handle shared between the orchestrator and the UI.
#[derive(Clone, Default)]
pub struct SyncStatusTracker {
    inner: Arc<Inner>,
}

impl SyncStatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote operation started.
    pub fn start(&self) {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// A remote operation finished successfully; clears any recorded error.
    pub fn success(&self) {
        self.decrement();
        self.set_error(None);
    }

    /// A remote operation failed; records the message.
    pub fn fail(&self, message: impl Into<String>) {
        self.decrement();
        self.set_error(Some(message.into()));
    }

    /// Clear the recorded error; status falls back to the pending counter.
    pub fn clear_error(&self) {
        self.set_error(None);
    }

    /// Current status: an unacknowledged error wins, then the counter.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        if self.last_error().is_some() {
            return SyncStatus::Error;
        }
        if self.inner.pending.load(Ordering::SeqCst) > 0 {
            SyncStatus::Syncing
        } else {
            SyncStatus::Idle
        }
    }

    /// Last recorded error message, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_error
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }

    fn decrement(&self) {
        // Floored at zero; a stray success after a reset must not underflow.
        let _ = self
            .inner
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                Some(pending.saturating_sub(1))
            });
    }

    fn set_error(&self, message: Option<String>) {
        if let Ok(mut guard) = self.inner.last_error.lock() {
            *guard = message;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let tracker = SyncStatusTracker::new();
        assert_eq!(tracker.status(), SyncStatus::Idle);
        assert_eq!(tracker.last_error(), None);
    }

    #[test]
    fn overlapping_operations_stay_syncing() {
        let tracker = SyncStatusTracker::new();
        tracker.start();
        tracker.start();
        assert_eq!(tracker.status(), SyncStatus::Syncing);

        tracker.success();
        assert_eq!(tracker.status(), SyncStatus::Syncing);

        tracker.success();
        assert_eq!(tracker.status(), SyncStatus::Idle);
    }

    #[test]
    fn failure_wins_regardless_of_pending_counter() {
        let tracker = SyncStatusTracker::new();
        tracker.start();
        tracker.start();
        tracker.fail("network unreachable");
        assert_eq!(tracker.status(), SyncStatus::Error);
        assert_eq!(tracker.last_error().as_deref(), Some("network unreachable"));
    }

    #[test]
    fn success_clears_previous_error() {
        let tracker = SyncStatusTracker::new();
        tracker.start();
        tracker.fail("boom");
        tracker.start();
        tracker.success();
        assert_eq!(tracker.status(), SyncStatus::Idle);
        assert_eq!(tracker.last_error(), None);
    }

    #[test]
    fn clear_error_falls_back_to_counter() {
        let tracker = SyncStatusTracker::new();
        tracker.start();
        tracker.start();
        tracker.fail("boom");
        tracker.clear_error();
        assert_eq!(tracker.status(), SyncStatus::Syncing);

        tracker.success();
        tracker.clear_error();
        assert_eq!(tracker.status(), SyncStatus::Idle);
    }

    #[test]
    fn counter_is_floored_at_zero() {
        let tracker = SyncStatusTracker::new();
        tracker.success();
        tracker.success();
        assert_eq!(tracker.status(), SyncStatus::Idle);
        tracker.start();
        assert_eq!(tracker.status(), SyncStatus::Syncing);
    }
}
