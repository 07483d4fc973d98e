//! Request description and buffered response.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::resilience::timeouts::TimeoutProfile;

/// Everything needed to (re)issue a call.
///
/// Cloneable so a call can be replayed after a session refresh.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
    /// Extra headers; composed headers take precedence.
    pub headers: HeaderMap,
    pub timeout: TimeoutProfile,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: HeaderMap::new(),
            timeout: TimeoutProfile::Standard,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post(body: Value) -> Self {
        Self::new(Method::POST).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutProfile) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Anything other than a pure read.
    pub fn is_state_changing(&self) -> bool {
        is_state_changing(&self.method)
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

pub fn is_state_changing(method: &Method) -> bool {
    !method.is_safe()
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Request path that produced this response.
    pub path: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(path: impl Into<String>, status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
