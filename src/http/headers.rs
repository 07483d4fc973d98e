//! Per-call header composition.
//!
//! Every call gets a fresh `X-Request-ID`; state-changing calls also carry
//! the anti-forgery token read from its cookie, fetching one first when the
//! cookie is missing. Nothing is cached beyond the cookie jar itself.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use uuid::Uuid;

use crate::http::error::{ClientError, ClientResult};
use crate::http::request::is_state_changing;
use crate::http::response::{error_from_response, normalize};
use crate::http::transport::Transport;
use crate::session::tokens::TokenStore;

/// Outbound trace identifier header.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Body of the anti-forgery token endpoint.
#[derive(Debug, Deserialize)]
struct CsrfTokenResponse {
    csrf_token: String,
}

/// Generate a per-call trace identifier (UUID v4).
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds the header set for each call.
#[derive(Clone)]
pub struct HeaderComposer {
    transport: Transport,
    tokens: Arc<TokenStore>,
    csrf_header: HeaderName,
    csrf_endpoint: String,
    timeout: Duration,
}

impl HeaderComposer {
    pub fn new(
        transport: Transport,
        tokens: Arc<TokenStore>,
        csrf_header: HeaderName,
        csrf_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            tokens,
            csrf_header,
            csrf_endpoint: csrf_endpoint.into(),
            timeout,
        }
    }

    /// Headers for one call.
    ///
    /// `csrf_override` is used instead of the cookie when the caller already
    /// holds a freshly fetched token. A token that cannot be obtained is left
    /// off; the server's rejection then drives the pipeline's single retry.
    pub async fn compose(&self, method: &Method, csrf_override: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&new_request_id()) {
            headers.insert(X_REQUEST_ID, value);
        }

        if !is_state_changing(method) {
            return headers;
        }

        let token = match csrf_override {
            Some(token) => Some(token.to_string()),
            None => match self.tokens.csrf_token() {
                Some(token) => Some(token),
                None => match self.refresh_csrf_token().await {
                    Ok(token) => Some(token),
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not obtain CSRF token, sending without it");
                        None
                    }
                },
            },
        };

        if let Some(token) = token {
            match HeaderValue::from_str(&token) {
                Ok(value) => {
                    headers.insert(self.csrf_header.clone(), value);
                }
                Err(_) => tracing::warn!("CSRF token is not a valid header value"),
            }
        }
        headers
    }

    /// Fetch a fresh token from the token endpoint.
    ///
    /// The endpoint normally deposits the cookie itself; if it did not, the
    /// token is written into the jar so later calls find it.
    pub async fn refresh_csrf_token(&self) -> ClientResult<String> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&new_request_id()) {
            headers.insert(X_REQUEST_ID, value);
        }

        let raw = self
            .transport
            .send(&self.csrf_endpoint, &Method::GET, headers, None, self.timeout)
            .await?;
        if !raw.is_success() {
            return Err(ClientError::Api(error_from_response(&raw)));
        }

        let token = normalize::<CsrfTokenResponse>(&raw)?.csrf_token;
        if self.tokens.csrf_token().as_deref() != Some(token.as_str()) {
            self.tokens.set_csrf_token(&token);
        }
        tracing::debug!("CSRF token refreshed");
        Ok(token)
    }

    pub fn csrf_header(&self) -> &HeaderName {
        &self.csrf_header
    }
}
