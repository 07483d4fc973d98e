//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline, coordinator and breaker produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - The X-Request-ID of every call is attached to its log events
//! - Metrics go through the `metrics` facade; the host application installs
//!   whichever recorder/exporter it uses

pub mod logging;
pub mod metrics;
