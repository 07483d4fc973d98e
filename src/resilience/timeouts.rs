//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every network call with a deadline
//! - Cancel the in-flight call cleanly on timeout (the future is dropped)
//! - Offer a standard and a large-payload profile
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - No retry here; retry policy lives in the pipeline

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::TimeoutConfig;
use crate::http::error::{ClientError, ClientResult};
use crate::observability::metrics;

/// Which timeout bound applies to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutProfile {
    #[default]
    Standard,
    /// Uploads, exports and other large transfers.
    LargePayload,
}

/// Resolved durations for each profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub standard: Duration,
    pub large_payload: Duration,
}

impl TimeoutPolicy {
    pub fn duration(&self, profile: TimeoutProfile) -> Duration {
        match profile {
            TimeoutProfile::Standard => self.standard,
            TimeoutProfile::LargePayload => self.large_payload,
        }
    }
}

impl From<&TimeoutConfig> for TimeoutPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            standard: Duration::from_secs(config.default_secs),
            large_payload: Duration::from_secs(config.large_payload_secs),
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Run `fut` with a deadline, cancelling it if the deadline passes first.
pub async fn with_timeout<F, T>(path: &str, duration: Duration, fut: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(path, timeout_ms = duration.as_millis() as u64, "Request timed out");
            metrics::record_timeout();
            Err(ClientError::Timeout {
                path: path.to_string(),
                timeout: duration,
            })
        }
    }
}
