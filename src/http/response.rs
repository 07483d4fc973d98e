//! Response normalization.
//!
//! # Responsibilities
//! - Unwrap the `{success, message, data}` envelope, or pass a bare legacy
//!   payload through
//! - Turn error envelopes, rate limits and undecodable bodies into `ApiError`
//! - Recognise anti-forgery rejections for the pipeline's single retry
//!
//! # Design Decisions
//! - Callers never see a raw JSON parse error
//! - `Retry-After` is read as integer seconds only

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::error::{codes, ApiError};
use crate::http::request::RawResponse;
use crate::http::X_REQUEST_ID;

/// Success envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SuccessEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Decode a response into its payload or a typed error.
pub fn normalize<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, ApiError> {
    if !raw.is_success() {
        return Err(error_from_response(raw));
    }

    let value = if raw.body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&raw.body)
            .map_err(|e| parse_error(raw, format!("Malformed response body: {}", e)))?
    };

    let payload = match value {
        Value::Object(mut map) if map.get("success").is_some_and(Value::is_boolean) => {
            if map.get("success") == Some(&Value::Bool(false)) {
                return Err(envelope_error(raw, Value::Object(map)));
            }
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(payload)
        .map_err(|e| parse_error(raw, format!("Unexpected response shape: {}", e)))
}

/// Build the typed error for a non-success response.
pub fn error_from_response(raw: &RawResponse) -> ApiError {
    let mut error = match serde_json::from_slice::<Value>(&raw.body) {
        Ok(value @ Value::Object(_)) => envelope_error(raw, value),
        _ => ApiError {
            message: fallback_message(raw),
            code: raw.status.as_u16() as i64,
            http_status: raw.status.as_u16(),
            request_id: response_request_id(raw),
            retry_after_seconds: None,
        },
    };

    if raw.status == StatusCode::TOO_MANY_REQUESTS {
        error.retry_after_seconds = raw.header(RETRY_AFTER.as_str()).and_then(parse_retry_after);
    }
    error
}

/// Whether a response is the server rejecting the anti-forgery token.
pub fn is_csrf_failure(raw: &RawResponse) -> bool {
    if raw.status != StatusCode::FORBIDDEN {
        return false;
    }
    match serde_json::from_slice::<ErrorEnvelope>(&raw.body) {
        Ok(envelope) => {
            mentions_csrf(&envelope.error) || mentions_csrf(&envelope.message)
        }
        Err(_) => mentions_csrf(&raw.text()),
    }
}

/// Parse `Retry-After` as a non-negative integer number of seconds.
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn mentions_csrf(text: &str) -> bool {
    text.to_ascii_lowercase().contains("csrf")
}

fn envelope_error(raw: &RawResponse, value: Value) -> ApiError {
    let envelope: ErrorEnvelope = serde_json::from_value(value).unwrap_or_default();

    let message = if !envelope.message.is_empty() {
        envelope.message
    } else if !envelope.error.is_empty() {
        envelope.error
    } else {
        fallback_message(raw)
    };

    ApiError {
        message,
        code: envelope.code.unwrap_or(raw.status.as_u16() as i64),
        http_status: raw.status.as_u16(),
        request_id: envelope.request_id.or_else(|| response_request_id(raw)),
        retry_after_seconds: None,
    }
}

fn parse_error(raw: &RawResponse, message: String) -> ApiError {
    tracing::warn!(path = %raw.path, status = %raw.status, "{}", message);
    ApiError {
        message,
        code: codes::PARSE_ERROR,
        http_status: raw.status.as_u16(),
        request_id: response_request_id(raw),
        retry_after_seconds: None,
    }
}

fn fallback_message(raw: &RawResponse) -> String {
    raw.status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", raw.status.as_u16()))
}

fn response_request_id(raw: &RawResponse) -> Option<String> {
    raw.header(X_REQUEST_ID).map(str::to_string)
}
