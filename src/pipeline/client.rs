//! Public entry point: the authenticated request pipeline.
//!
//! # Data Flow
//! ```text
//! execute(path, options)
//!     → HeaderComposer (X-Request-ID, X-CSRF-Token)
//!     → Transport under the timeout guard
//!     → 403 CSRF on a write: fresh token, one retry
//!     → 401 on a non-auth path: RefreshCoordinator (breaker, single flight, replay)
//!     → 429: surfaced with Retry-After, never retried here
//!     → normalize() for the typed helpers
//! ```
//!
//! `ApiClient` owns no mutable state of its own; clones share the same
//! coordinator, breaker and cookie jar.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use url::Url;

use crate::auth::coordinator::{RefreshCoordinator, ReplayFn};
use crate::auth::refresher::{HttpSessionRefresher, SessionRefresher};
use crate::config::validation::validate_config;
use crate::config::ClientConfig;
use crate::http::error::{ClientError, ClientResult};
use crate::http::headers::{HeaderComposer, X_REQUEST_ID};
use crate::http::request::{RawResponse, RequestOptions};
use crate::http::response::{is_csrf_failure, normalize, parse_retry_after};
use crate::http::transport::Transport;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::resilience::timeouts::{TimeoutPolicy, TimeoutProfile};
use crate::session::clock::{Clock, SystemClock};
use crate::session::signal::{SessionExpired, SessionSignal};
use crate::session::store::SessionStore;
use crate::session::tokens::TokenStore;

struct ClientInner {
    transport: Transport,
    headers: HeaderComposer,
    tokens: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    signal: Arc<SessionSignal>,
    timeouts: TimeoutPolicy,
    auth_paths: Vec<String>,
}

/// Resilient, session-aware API client.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// Build a client with the default refresher, system clock and a fresh store.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::builder(config).build()
    }

    /// Execute a call, recovering from CSRF rejection and session expiry.
    ///
    /// Returns the raw response; non-success statuses are not errors at this
    /// level (see [`ApiClient::request`] for typed results).
    pub async fn execute(&self, path: &str, options: RequestOptions) -> ClientResult<RawResponse> {
        let response = self.send_with_csrf_retry(path, &options).await?;

        match response.status {
            StatusCode::UNAUTHORIZED if !self.is_auth_path(path) => {
                let replay = self.replay_fn(path, options);
                self.inner.coordinator.request_refresh(response, replay).await
            }
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::info!(
                    path,
                    retry_after = ?response.header(RETRY_AFTER.as_str()).and_then(parse_retry_after),
                    "Rate limited"
                );
                Ok(response)
            }
            _ => Ok(response),
        }
    }

    /// Execute a call and normalize the response into `T` or a typed error.
    pub async fn request<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> ClientResult<T> {
        let response = self.execute(path, options).await?;
        Ok(normalize(&response)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with_body(Method::POST, path, body).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with_body(Method::PUT, path, body).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with_body(Method::PATCH, path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(path, RequestOptions::new(Method::DELETE)).await
    }

    /// POST under the large-payload timeout profile.
    pub async fn upload<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let options = RequestOptions::post(serde_json::to_value(body)?)
            .with_timeout(TimeoutProfile::LargePayload);
        self.request(path, options).await
    }

    /// Record a completed login or registration: opens the grace window and
    /// closes the breaker.
    pub fn mark_authenticated(&self) {
        self.inner.tokens.mark_authenticated();
        self.inner.coordinator.breaker().reset();
    }

    /// Forget session bookkeeping after logout.
    pub fn end_session(&self) {
        self.inner.tokens.clear_grace();
        self.inner.coordinator.breaker().reset();
    }

    pub fn subscribe_session_expired(&self) -> broadcast::Receiver<SessionExpired> {
        self.inner.signal.subscribe()
    }

    /// Tell the client the login view is showing, suppressing expiry signals.
    pub fn set_on_login_view(&self, on_login_view: bool) {
        self.inner.signal.set_on_login_view(on_login_view);
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.inner.coordinator.breaker().state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        self.inner.coordinator.breaker()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    pub fn in_grace_period(&self) -> bool {
        self.inner.tokens.in_grace()
    }

    /// Anti-forgery token currently held in the cookie jar.
    pub fn csrf_token(&self) -> Option<String> {
        self.inner.tokens.csrf_token()
    }

    /// Fetch a fresh anti-forgery token.
    pub async fn refresh_csrf_token(&self) -> ClientResult<String> {
        self.inner.headers.refresh_csrf_token().await
    }

    pub fn base_url(&self) -> &Url {
        self.inner.transport.base_url()
    }

    async fn request_with_body<T, B>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let options = RequestOptions::new(method).with_body(serde_json::to_value(body)?);
        self.request(path, options).await
    }

    /// One call plus at most one retry after a CSRF rejection. No 401 handling,
    /// which also makes this the replay path.
    async fn send_with_csrf_retry(&self, path: &str, options: &RequestOptions) -> ClientResult<RawResponse> {
        let timeout = self.inner.timeouts.duration(options.timeout);

        let headers = self.compose(options, None).await;
        let response = self.send(path, options, headers, timeout).await?;

        if !options.is_state_changing() || !is_csrf_failure(&response) {
            return Ok(response);
        }

        metrics::record_csrf_retry();
        tracing::info!(path, "CSRF token rejected, refreshing and retrying once");

        let token = match self.inner.headers.refresh_csrf_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(path, error = %e, "CSRF token refresh failed");
                return Ok(response);
            }
        };

        let headers = self.compose(options, Some(&token)).await;
        self.send(path, options, headers, timeout).await
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        headers: HeaderMap,
        timeout: Duration,
    ) -> ClientResult<RawResponse> {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(request_id = %request_id, method = %options.method, path, "Sending request");

        self.inner
            .transport
            .send(path, &options.method, headers, options.body.as_ref(), timeout)
            .await
    }

    /// Caller headers overlaid with the composed ones.
    async fn compose(&self, options: &RequestOptions, csrf_override: Option<&str>) -> HeaderMap {
        let mut headers = options.headers.clone();
        headers.extend(self.inner.headers.compose(&options.method, csrf_override).await);
        headers
    }

    fn replay_fn(&self, path: &str, options: RequestOptions) -> ReplayFn {
        let client = self.clone();
        let path = path.to_string();
        let options = Arc::new(options);
        Arc::new(move || {
            let client = client.clone();
            let path = path.clone();
            let options = options.clone();
            async move { client.send_with_csrf_retry(&path, &options).await }.boxed()
        })
    }

    /// Login, refresh and register: retrying those on 401 would loop.
    fn is_auth_path(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        self.inner.auth_paths.iter().any(|auth| {
            path == auth
                || path
                    .strip_prefix(auth.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.transport.base_url().as_str())
            .field("timeouts", &self.inner.timeouts)
            .field("coordinator", &self.inner.coordinator)
            .finish()
    }
}

/// Builder for [`ApiClient`] with injectable collaborators.
pub struct ApiClientBuilder {
    config: ClientConfig,
    refresher: Option<Arc<dyn SessionRefresher>>,
    store: Option<SessionStore>,
    clock: Option<Arc<dyn Clock>>,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            refresher: None,
            store: None,
            clock: None,
        }
    }

    /// Replace the default HTTP refresher.
    pub fn refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Share session-scoped storage (breaker record, grace marker) with other clients.
    pub fn session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ClientResult<ApiClient> {
        let config = self.config;
        validate_config(&config).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ClientError::Config(messages.join(", "))
        })?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::Config(format!("Invalid base_url: {}", e)))?;
        let csrf_header = HeaderName::from_bytes(config.csrf.header_name.as_bytes())
            .map_err(|e| ClientError::Config(format!("Invalid csrf.header_name: {}", e)))?;

        let transport = Transport::new(base_url.clone())?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| SessionStore::new(config.session.scope.clone()));
        let timeouts = TimeoutPolicy::from(&config.timeouts);
        let refresh_timeout = Duration::from_secs(config.session.refresh_timeout_secs);

        let tokens = Arc::new(TokenStore::new(
            transport.jar(),
            base_url,
            config.csrf.cookie_name.clone(),
            store.clone(),
            clock.clone(),
            Duration::from_millis(config.session.grace_period_ms),
        ));
        let headers = HeaderComposer::new(
            transport.clone(),
            tokens.clone(),
            csrf_header,
            config.csrf.endpoint.clone(),
            timeouts.standard,
        );

        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpSessionRefresher::new(
                transport.clone(),
                headers.clone(),
                config.session.refresh_path.clone(),
                refresh_timeout,
            ))
        });
        let breaker = CircuitBreaker::from_config(&config.circuit_breaker, store, clock);
        let signal = Arc::new(SessionSignal::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            refresher,
            breaker,
            tokens.clone(),
            signal.clone(),
            refresh_timeout,
            Duration::from_millis(config.session.propagation_delay_ms),
        ));

        tracing::info!(
            base_url = %config.base_url,
            scope = %config.session.scope,
            default_timeout_secs = config.timeouts.default_secs,
            "API client initialized"
        );

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                transport,
                headers,
                tokens,
                coordinator,
                signal,
                timeouts,
                auth_paths: config.session.auth_paths,
            }),
        })
    }
}
