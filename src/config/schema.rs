//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client
//! pipeline. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto (e.g., "https://app.example.com/api").
    pub base_url: String,

    /// Timeout profiles.
    pub timeouts: TimeoutConfig,

    /// Anti-forgery token settings.
    pub csrf: CsrfConfig,

    /// Session refresh and grace settings.
    pub session: SessionConfig,

    /// Circuit breaker guarding the refresh endpoint.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeouts: TimeoutConfig::default(),
            csrf: CsrfConfig::default(),
            session: SessionConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Timeout configuration for the two call profiles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default bound for ordinary calls, in seconds.
    pub default_secs: u64,

    /// Bound for large-payload calls (uploads, exports), in seconds.
    pub large_payload_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 30,
            large_payload_secs: 120,
        }
    }
}

/// Anti-forgery (double-submit cookie) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Name of the cookie the server deposits the token into.
    pub cookie_name: String,

    /// Header the token is echoed back in on state-changing calls.
    pub header_name: String,

    /// Endpoint that issues a fresh token.
    pub endpoint: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf_token".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            endpoint: "/csrf-token".to_string(),
        }
    }
}

/// Session refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Scoping key for session-scoped storage (one per tab / connection).
    pub scope: String,

    /// Endpoint the default refresher posts to.
    pub refresh_path: String,

    /// Authentication endpoints whose 401s are returned as-is.
    pub auth_paths: Vec<String>,

    /// Window after login during which 401s are treated as cookie
    /// propagation noise, in milliseconds.
    pub grace_period_ms: u64,

    /// Wait before the second replay of a call that still sees 401
    /// after a successful refresh, in milliseconds.
    pub propagation_delay_ms: u64,

    /// Bound on a single refresh attempt, in seconds.
    pub refresh_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            auth_paths: vec![
                "/auth/login".to_string(),
                "/auth/refresh".to_string(),
                "/auth/register".to_string(),
            ],
            grace_period_ms: 5_000,
            propagation_delay_ms: 300,
            refresh_timeout_secs: 30,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive refresh failures before the breaker opens.
    pub max_failures: u32,

    /// Seconds after the last failure before the breaker resets itself.
    pub reset_window_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            reset_window_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeouts.default_secs, 30);
        assert_eq!(config.timeouts.large_payload_secs, 120);
        assert_eq!(config.circuit_breaker.max_failures, 3);
        assert_eq!(config.circuit_breaker.reset_window_secs, 10);
        assert_eq!(config.csrf.header_name, "X-CSRF-Token");
        assert!(config.session.auth_paths.contains(&"/auth/refresh".to_string()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            base_url = "https://api.example.com"

            [circuit_breaker]
            max_failures = 5

            [observability]
            log_format = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.circuit_breaker.max_failures, 5);
        assert_eq!(config.circuit_breaker.reset_window_secs, 10);
        assert_eq!(config.observability.log_format, LogFormat::Compact);
        assert_eq!(config.session.refresh_path, "/auth/refresh");
    }
}
