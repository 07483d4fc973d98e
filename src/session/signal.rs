//! Out-of-band session-expired notification.
//!
//! Fire-and-forget broadcast consumed by the application shell (typically to
//! redirect to a login view). Distinct from the failing call's own result.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::observability::metrics;

/// Why the session was declared expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The refresh attempt did not restore a valid session.
    RefreshFailed,
    /// The circuit breaker is open; no refresh was attempted.
    CircuitOpen,
}

/// Session-expired event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExpired {
    /// Path of the call that observed the expiry.
    pub path: String,
    pub reason: ExpiryReason,
}

/// Broadcast channel for session-expired events.
pub struct SessionSignal {
    tx: broadcast::Sender<SessionExpired>,
    on_login_view: AtomicBool,
}

impl SessionSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            on_login_view: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionExpired> {
        self.tx.subscribe()
    }

    /// Suppress signals while the user is already looking at the login view.
    pub fn set_on_login_view(&self, on_login_view: bool) {
        self.on_login_view.store(on_login_view, Ordering::SeqCst);
    }

    /// Emit an event. Returns whether it was emitted (not suppressed).
    pub fn emit(&self, event: SessionExpired) -> bool {
        if self.on_login_view.load(Ordering::SeqCst) {
            tracing::debug!(path = %event.path, "Session expired on login view, not signalling");
            return false;
        }

        tracing::warn!(path = %event.path, reason = ?event.reason, "Session expired");
        metrics::record_session_expired();
        // No subscribers is fine.
        let _ = self.tx.send(event);
        true
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}
