//! Circuit breaker over session refresh attempts.
//!
//! # States
//! - Closed: refresh attempts allowed
//! - Open: session presumed irrecoverable, 401s fail fast without refreshing
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= max_failures
//! Open → Closed: reset_at passed (checked lazily on the next read)
//! any → Closed: reset() after a successful refresh or login
//! ```
//!
//! # Design Decisions
//! - The record lives in session-scoped storage, so it survives a client
//!   being rebuilt within the same scope and is isolated between scopes
//! - Every operation is a single read-modify-write on the stored entry
//! - Each failure pushes reset_at forward; the window counts from the last failure

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CircuitBreakerConfig;
use crate::session::clock::{deadline_after, Clock};
use crate::session::store::SessionStore;

const RECORD_KEY: &str = "auth_circuit_breaker";

/// Persisted breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub failure_count: u32,
    /// Epoch milliseconds at which the record expires.
    pub reset_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

/// Failure-counting breaker guarding the refresh collaborator.
#[derive(Clone)]
pub struct CircuitBreaker {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    max_failures: u32,
    reset_window: Duration,
}

impl CircuitBreaker {
    pub fn new(
        store: SessionStore,
        clock: Arc<dyn Clock>,
        max_failures: u32,
        reset_window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            max_failures,
            reset_window,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig, store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            store,
            clock,
            config.max_failures,
            Duration::from_secs(config.reset_window_secs),
        )
    }

    /// Count a refresh attempt that did not restore the session.
    pub fn increment(&self) -> CircuitBreakerRecord {
        let now = self.clock.now_ms();
        let reset_at = deadline_after(now, self.reset_window);

        let record = self
            .store
            .update::<CircuitBreakerRecord, _>(RECORD_KEY, |current| {
                let failure_count = current
                    .filter(|r| !expired(r, now))
                    .map_or(0, |r| r.failure_count)
                    .saturating_add(1);
                Some(CircuitBreakerRecord {
                    failure_count,
                    reset_at: Some(reset_at),
                })
            })
            .unwrap_or_default();

        if record.failure_count == self.max_failures {
            tracing::warn!(
                failure_count = record.failure_count,
                reset_at,
                "Session refresh circuit opened"
            );
        } else {
            tracing::debug!(failure_count = record.failure_count, "Session refresh failure recorded");
        }
        record
    }

    /// Clear the record. Called after a successful refresh or login.
    pub fn reset(&self) {
        self.store.remove(RECORD_KEY);
    }

    /// Current record, with lazy expiry applied.
    pub fn record(&self) -> CircuitBreakerRecord {
        let now = self.clock.now_ms();
        self.store
            .update::<CircuitBreakerRecord, _>(RECORD_KEY, |current| {
                current.filter(|r| !expired(r, now))
            })
            .unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.record().failure_count >= self.max_failures
    }

    pub fn state(&self) -> CircuitState {
        if self.is_open() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("scope", &self.store.scope())
            .field("max_failures", &self.max_failures)
            .field("reset_window", &self.reset_window)
            .finish()
    }
}

fn expired(record: &CircuitBreakerRecord, now: u64) -> bool {
    record.reset_at.is_some_and(|reset_at| now >= reset_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;

    fn breaker(clock: Arc<ManualClock>, store: SessionStore) -> CircuitBreaker {
        CircuitBreaker::new(store, clock, 3, Duration::from_secs(10))
    }

    #[test]
    fn test_opens_at_threshold() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cb = breaker(clock, SessionStore::default());

        assert_eq!(cb.state(), CircuitState::Closed);
        cb.increment();
        cb.increment();
        assert!(!cb.is_open());
        cb.increment();
        assert!(cb.is_open());
        assert_eq!(cb.record().failure_count, 3);
    }

    #[test]
    fn test_lazy_reset_after_window() {
        let clock = Arc::new(ManualClock::new(0));
        let store = SessionStore::default();
        let cb = breaker(clock.clone(), store.clone());

        for _ in 0..3 {
            cb.increment();
        }
        assert!(cb.is_open());

        clock.advance(Duration::from_millis(9_999));
        assert!(cb.is_open());

        clock.advance(Duration::from_millis(1));
        assert!(!cb.is_open());
        assert_eq!(cb.record().failure_count, 0);
        // The expired record was cleared from storage, not just ignored.
        assert!(store.get::<CircuitBreakerRecord>(RECORD_KEY).is_none());
    }

    #[test]
    fn test_failure_after_expiry_starts_over() {
        let clock = Arc::new(ManualClock::new(0));
        let cb = breaker(clock.clone(), SessionStore::default());

        cb.increment();
        cb.increment();
        clock.advance(Duration::from_secs(11));

        let record = cb.increment();
        assert_eq!(record.failure_count, 1);
        assert_eq!(record.reset_at, Some(21_000));
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cb = CircuitBreaker::new(
            SessionStore::default(),
            clock.clone(),
            3,
            Duration::from_secs(9_223_372_036_854_775_807),
        );

        let record = cb.increment();
        assert_eq!(record.reset_at, Some(u64::MAX));
        cb.increment();
        cb.increment();
        assert!(cb.is_open());

        clock.advance(Duration::from_secs(86_400 * 365));
        assert!(cb.is_open());
    }

    #[test]
    fn test_reset_closes() {
        let clock = Arc::new(ManualClock::new(0));
        let cb = breaker(clock, SessionStore::default());
        for _ in 0..5 {
            cb.increment();
        }
        assert!(cb.is_open());

        cb.reset();
        assert!(!cb.is_open());
        assert_eq!(cb.record(), CircuitBreakerRecord::default());
    }

    #[test]
    fn test_record_is_shared_per_scope() {
        let clock = Arc::new(ManualClock::new(0));
        let store = SessionStore::new("tab-1");

        let first = breaker(clock.clone(), store.clone());
        for _ in 0..3 {
            first.increment();
        }

        let rebuilt = breaker(clock.clone(), store.clone());
        assert!(rebuilt.is_open());

        let other_tab = breaker(clock, store.scoped("tab-2"));
        assert!(!other_tab.is_open());
    }
}
