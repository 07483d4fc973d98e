//! Raw HTTP transport.
//!
//! Owns the reqwest client and the cookie jar holding the session and CSRF
//! cookies. Every send is bounded by the timeout guard and fully buffered,
//! so the response can be inspected, handed back later, or replayed against.
//! No retry, CSRF or 401 logic lives here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use url::Url;

use crate::http::error::{ClientError, ClientResult};
use crate::http::request::RawResponse;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

/// Cookie-carrying HTTP transport rooted at a base URL.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl Transport {
    /// Build a transport with its own client and cookie jar.
    pub fn new(base_url: Url) -> ClientResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, jar, base_url))
    }

    /// Use an existing client. `client` must have been built with `jar` as its
    /// cookie provider, otherwise CSRF cookies written by the server are invisible.
    pub fn with_client(client: Client, jar: Arc<Jar>, base_url: Url) -> Self {
        Self {
            client,
            jar,
            base_url,
        }
    }

    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path (which may carry a query string) against the base URL.
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        if !path.starts_with('/') {
            return Err(ClientError::InvalidPath(path.to_string()));
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path)).map_err(|_| ClientError::InvalidPath(path.to_string()))
    }

    /// Send one request and buffer the whole response within `timeout`.
    pub async fn send(
        &self,
        path: &str,
        method: &Method,
        headers: HeaderMap,
        body: Option<&Value>,
        timeout: Duration,
    ) -> ClientResult<RawResponse> {
        let url = self.url(path)?;
        let mut request = self.client.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let start = Instant::now();
        let response = with_timeout(path, timeout, async {
            let response = request.send().await.map_err(|e| network_error(path, e))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| network_error(path, e))?;
            Ok(RawResponse::new(path, status, headers, body.to_vec()))
        })
        .await?;

        metrics::record_request(method.as_str(), response.status.as_u16(), start);
        tracing::debug!(
            method = %method,
            path,
            status = response.status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Response received"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

fn network_error(path: &str, source: reqwest::Error) -> ClientError {
    tracing::warn!(path, error = %source, "Network error");
    ClientError::Network {
        path: path.to_string(),
        source,
    }
}
