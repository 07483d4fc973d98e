//! Resilient authenticated request pipeline.
//!
//! A client-side HTTP layer for session-cookie APIs that survives session
//! expiry (single-flight refresh with replay), double-submit CSRF protection
//! (one silent token refresh and retry), slow or hung calls (per-call
//! timeouts) and refresh storms (a circuit breaker over refresh failures).
//!
//! ```no_run
//! use session_pipeline::{ApiClient, ClientConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = ClientConfig::default();
//! config.base_url = "https://app.example.com/api".to_string();
//!
//! let client = ApiClient::new(config)?;
//! let mut expired = client.subscribe_session_expired();
//! tokio::spawn(async move {
//!     while let Ok(event) = expired.recv().await {
//!         eprintln!("session expired on {}, redirecting to login", event.path);
//!     }
//! });
//!
//! let profile: serde_json::Value = client.get("/me").await?;
//! println!("{}", profile);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod http;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod session;

pub use auth::{HttpSessionRefresher, SessionRefresher};
pub use config::ClientConfig;
pub use http::{ApiError, ClientError, ClientResult, RawResponse, RequestOptions};
pub use pipeline::{ApiClient, ApiClientBuilder};
pub use resilience::{CircuitState, TimeoutProfile};
pub use session::{ExpiryReason, SessionExpired, SessionStore};
