//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the server:
//!     → timeouts.rs (bound and cancel every network call)
//! 401 observed:
//!     → circuit_breaker.rs (fail fast once refreshes keep failing)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Rate-limited and timed-out calls are never retried automatically
//! - The breaker prevents 401 → refresh → 401 storms

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRecord, CircuitState};
pub use timeouts::{with_timeout, TimeoutPolicy, TimeoutProfile};
