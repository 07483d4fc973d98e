//! Metrics collection.
//!
//! # Metrics
//! - `client_requests_total` (counter): completed calls by method, status
//! - `client_request_duration_seconds` (histogram): per-attempt latency
//! - `client_timeouts_total` (counter): calls cut off by the timeout guard
//! - `client_csrf_retries_total` (counter): silent anti-forgery retries
//! - `client_session_refreshes_total` (counter): refresh attempts by outcome
//! - `client_circuit_short_circuits_total` (counter): 401s answered by an open breaker
//! - `client_refresh_queue_depth` (gauge): callers parked behind a refresh
//! - `client_session_expired_total` (counter): session-expired signals emitted

use std::time::Instant;

use metrics::{counter, gauge, histogram};

/// Record a completed network attempt.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("client_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a call that exceeded its timeout.
pub fn record_timeout() {
    counter!("client_timeouts_total").increment(1);
}

/// Record a silent anti-forgery retry.
pub fn record_csrf_retry() {
    counter!("client_csrf_retries_total").increment(1);
}

/// Record the outcome of a session refresh attempt.
pub fn record_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("client_session_refreshes_total", "outcome" => outcome).increment(1);
}

/// Record a 401 short-circuited by the open breaker.
pub fn record_short_circuit() {
    counter!("client_circuit_short_circuits_total").increment(1);
}

/// Record the number of callers waiting on the in-flight refresh.
pub fn record_queue_depth(depth: usize) {
    gauge!("client_refresh_queue_depth").set(depth as f64);
}

/// Record an emitted session-expired signal.
pub fn record_session_expired() {
    counter!("client_session_expired_total").increment(1);
}
