//! Session refresh collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use crate::http::headers::HeaderComposer;
use crate::http::transport::Transport;

/// Restores a valid session from a refresh credential.
///
/// Implementations must not route through the pipeline's 401 handling,
/// otherwise a failing refresh would queue behind itself.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    /// Returns whether the session is valid afterwards.
    async fn refresh_session(&self) -> bool;
}

/// Default refresher: POSTs the refresh endpoint over the shared transport
/// so the refreshed session cookie lands in the same jar.
#[derive(Clone)]
pub struct HttpSessionRefresher {
    transport: Transport,
    headers: HeaderComposer,
    path: String,
    timeout: Duration,
}

impl HttpSessionRefresher {
    pub fn new(
        transport: Transport,
        headers: HeaderComposer,
        path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            headers,
            path: path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SessionRefresher for HttpSessionRefresher {
    async fn refresh_session(&self) -> bool {
        let headers = self.headers.compose(&Method::POST, None).await;
        match self
            .transport
            .send(&self.path, &Method::POST, headers, None, self.timeout)
            .await
        {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                tracing::info!(
                    path = %self.path,
                    status = response.status.as_u16(),
                    "Session refresh rejected"
                );
                false
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "Session refresh failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for HttpSessionRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionRefresher")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}
