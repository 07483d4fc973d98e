//! Single-flight session refresh.
//!
//! # Responsibilities
//! - Park every caller that observed a 401 in a FIFO queue
//! - Run at most one `refresh_session()` at a time, however many callers wait
//! - On success: reset the breaker and replay each parked call
//! - On failure: count it in the breaker, hand every caller its own 401 back
//!   and signal session expiry (outside the grace window)
//!
//! # Design Decisions
//! - "Is a refresh running" and "start one" happen in the same critical
//!   section as the enqueue, with no await in between
//! - The refresh runs in its own task: a caller that times out or is dropped
//!   never cancels the shared refresh or the other callers
//! - The queue is drained and the in-flight flag cleared together, so an idle
//!   coordinator never holds parked callers
//! - Replays settle independently; only admission order is FIFO

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::StatusCode;
use tokio::sync::oneshot;

use crate::auth::refresher::SessionRefresher;
use crate::http::error::{ClientError, ClientResult};
use crate::http::request::RawResponse;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::session::signal::{ExpiryReason, SessionExpired, SessionSignal};
use crate::session::tokens::TokenStore;

/// Re-issues a call that failed with 401. Called once, or twice when the
/// refreshed cookie has not propagated yet.
pub type ReplayFn = Arc<dyn Fn() -> BoxFuture<'static, ClientResult<RawResponse>> + Send + Sync>;

/// A caller parked behind the in-flight refresh.
struct QueuedCall {
    original: RawResponse,
    replay: ReplayFn,
    settle: oneshot::Sender<ClientResult<RawResponse>>,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    queue: VecDeque<QueuedCall>,
}

/// Coordinates session refreshes for one client.
pub struct RefreshCoordinator {
    refresher: Arc<dyn SessionRefresher>,
    breaker: CircuitBreaker,
    tokens: Arc<TokenStore>,
    signal: Arc<SessionSignal>,
    state: Mutex<RefreshState>,
    refresh_timeout: Duration,
    propagation_delay: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn SessionRefresher>,
        breaker: CircuitBreaker,
        tokens: Arc<TokenStore>,
        signal: Arc<SessionSignal>,
        refresh_timeout: Duration,
        propagation_delay: Duration,
    ) -> Self {
        Self {
            refresher,
            breaker,
            tokens,
            signal,
            state: Mutex::new(RefreshState::default()),
            refresh_timeout,
            propagation_delay,
        }
    }

    /// Resolve a 401: wait for a refresh and replay, or fail fast.
    ///
    /// Resolves to the replayed call's result, or to `original` when the
    /// session could not be restored.
    pub async fn request_refresh(
        self: &Arc<Self>,
        original: RawResponse,
        replay: ReplayFn,
    ) -> ClientResult<RawResponse> {
        let path = original.path.clone();

        if self.breaker.is_open() {
            metrics::record_short_circuit();
            tracing::warn!(path = %path, "Refresh circuit open, failing fast");
            self.signal_expired(&path, ExpiryReason::CircuitOpen);
            return Ok(original);
        }

        let (settle, settled) = oneshot::channel();
        let start_refresh = {
            let mut state = self.lock_state();
            state.queue.push_back(QueuedCall {
                original,
                replay,
                settle,
            });
            metrics::record_queue_depth(state.queue.len());
            let start = !state.in_flight;
            state.in_flight = true;
            start
        };

        if start_refresh {
            tracing::info!(path = %path, "Session expired, starting refresh");
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_refresh().await;
            });
        } else {
            tracing::debug!(path = %path, "Joined in-flight session refresh");
        }

        settled.await.map_err(|_| ClientError::Abandoned(path))?
    }

    /// Whether a refresh is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Number of callers parked behind the current refresh.
    pub fn queued(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn run_refresh(self: Arc<Self>) {
        let refreshed = self.attempt_refresh().await;
        metrics::record_refresh(refreshed);

        // Breaker first, so a 401 arriving after the drain sees the new state.
        if refreshed {
            self.breaker.reset();
        } else {
            self.breaker.increment();
        }

        let drained = {
            let mut state = self.lock_state();
            state.in_flight = false;
            std::mem::take(&mut state.queue)
        };
        metrics::record_queue_depth(0);

        if refreshed {
            tracing::info!(queued = drained.len(), "Session refreshed, replaying queued calls");
            for call in drained {
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    let result = this.replay(&call.replay).await;
                    // The caller may have gone away; its replay still ran to completion.
                    let _ = call.settle.send(result);
                });
            }
        } else {
            tracing::warn!(queued = drained.len(), "Session refresh failed, releasing queued calls");
            let path = drained
                .front()
                .map(|call| call.original.path.clone())
                .unwrap_or_default();
            for QueuedCall {
                original, settle, ..
            } in drained
            {
                let _ = settle.send(Ok(original));
            }
            self.signal_expired(&path, ExpiryReason::RefreshFailed);
        }
    }

    /// One bounded refresh attempt. Timeouts and panics count as failure.
    async fn attempt_refresh(&self) -> bool {
        let refresher = Arc::clone(&self.refresher);
        let attempt = AssertUnwindSafe(async move { refresher.refresh_session().await }).catch_unwind();

        match tokio::time::timeout(self.refresh_timeout, attempt).await {
            Ok(Ok(valid)) => valid,
            Ok(Err(_)) => {
                tracing::error!("Session refresher panicked");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.refresh_timeout.as_millis() as u64,
                    "Session refresh timed out"
                );
                false
            }
        }
    }

    /// Replay a call, waiting once for cookie propagation on a stale 401.
    async fn replay(&self, replay: &ReplayFn) -> ClientResult<RawResponse> {
        let response = replay().await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(
            path = %response.path,
            delay_ms = self.propagation_delay.as_millis() as u64,
            "Replay still unauthorized, waiting for cookie propagation"
        );
        tokio::time::sleep(self.propagation_delay).await;
        replay().await
    }

    fn signal_expired(&self, path: &str, reason: ExpiryReason) {
        if self.tokens.in_grace() {
            tracing::debug!(path, "Within authentication grace period, not signalling expiry");
            return;
        }
        self.signal.emit(SessionExpired {
            path: path.to_string(),
            reason,
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("breaker", &self.breaker)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("propagation_delay", &self.propagation_delay)
            .finish()
    }
}
