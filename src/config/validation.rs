//! Configuration validation.
//!
//! Serde handles the syntactic side; this module checks value ranges and
//! cross-field constraints, and reports every problem rather than the first.

use reqwest::header::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if url.cannot_be_a_base() => {
            errors.push(ValidationError::new("base_url", "must be an absolute http(s) URL"));
        }
        Ok(url) if url.scheme() != "http" && url.scheme() != "https" => {
            errors.push(ValidationError::new(
                "base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("base_url", e.to_string())),
    }

    if config.timeouts.default_secs == 0 {
        errors.push(ValidationError::new("timeouts.default_secs", "must be greater than 0"));
    }
    if config.timeouts.large_payload_secs < config.timeouts.default_secs {
        errors.push(ValidationError::new(
            "timeouts.large_payload_secs",
            "must not be shorter than timeouts.default_secs",
        ));
    }

    if config.csrf.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("csrf.cookie_name", "must not be empty"));
    }
    if HeaderName::from_bytes(config.csrf.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "csrf.header_name",
            format!("'{}' is not a valid header name", config.csrf.header_name),
        ));
    }
    check_path(&mut errors, "csrf.endpoint", &config.csrf.endpoint);

    if config.session.scope.is_empty() {
        errors.push(ValidationError::new("session.scope", "must not be empty"));
    }
    check_path(&mut errors, "session.refresh_path", &config.session.refresh_path);
    for path in &config.session.auth_paths {
        check_path(&mut errors, "session.auth_paths", path);
    }
    if config.session.refresh_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "session.refresh_timeout_secs",
            "must be greater than 0",
        ));
    }

    if config.circuit_breaker.max_failures == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.max_failures",
            "must be at least 1",
        ));
    }
    if config.circuit_breaker.reset_window_secs == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.reset_window_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &str, path: &str) {
    if !path.starts_with('/') {
        errors.push(ValidationError::new(
            field,
            format!("'{}' must start with '/'", path),
        ));
    }
}
