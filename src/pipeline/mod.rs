//! Request pipeline.
//!
//! Composes headers, timeouts, CSRF recovery and session refresh behind
//! [`ApiClient`], the call contract consumed by route handlers and UI code.

pub mod client;

pub use client::{ApiClient, ApiClientBuilder};
