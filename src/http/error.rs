//! Error taxonomy for the request pipeline.

use std::time::Duration;

use thiserror::Error;

/// Well-known `ApiError::code` values produced on the client side.
///
/// Server codes are positive; these are negative so they never collide.
pub mod codes {
    /// The response body could not be decoded.
    pub const PARSE_ERROR: i64 = -1;
}

/// A non-success response, normalized.
///
/// Carries enough structure for callers to branch on `code` or `http_status`
/// without inspecting `message`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code}, status {http_status})")]
pub struct ApiError {
    pub message: String,
    pub code: i64,
    pub http_status: u16,
    pub request_id: Option<String>,
    /// Set on 429 responses carrying `Retry-After` in seconds.
    pub retry_after_seconds: Option<u64>,
}

impl ApiError {
    pub fn is_parse_error(&self) -> bool {
        self.code == codes::PARSE_ERROR
    }

    pub fn is_unauthorized(&self) -> bool {
        self.http_status == 401
    }

    pub fn is_forbidden(&self) -> bool {
        self.http_status == 403
    }

    pub fn is_rate_limited(&self) -> bool {
        self.http_status == 429
    }

    /// Suggested wait before retrying a rate-limited call.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_seconds.map(Duration::from_secs)
    }
}

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call did not complete within its timeout and was cancelled.
    #[error("Request to {path} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { path: String, timeout: Duration },

    /// The server answered with an error, or the body could not be decoded.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("Network error on {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The path could not be joined onto the base URL.
    #[error("Invalid request path '{0}'")]
    InvalidPath(String),

    /// The request body could not be serialized.
    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// A queued call was dropped without being settled.
    #[error("Queued call to {0} was abandoned before settling")]
    Abandoned(String),

    /// The client could not be constructed.
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// The typed API error, if this is one.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
