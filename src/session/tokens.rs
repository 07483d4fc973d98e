//! Anti-forgery token and authentication grace marker.
//!
//! The CSRF token lives in the cookie jar the server writes to; nothing is
//! cached beside it. The grace marker is kept in memory and mirrored into
//! session-scoped storage, which survives the in-memory copy being lost.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use crate::session::clock::{deadline_after, Clock};
use crate::session::store::SessionStore;

const GRACE_KEY: &str = "auth_grace_until";

/// Reads the CSRF cookie and owns the post-login grace marker.
pub struct TokenStore {
    jar: Arc<Jar>,
    base_url: Url,
    cookie_name: String,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    grace_window: Duration,
    grace_until: Mutex<Option<u64>>,
}

impl TokenStore {
    pub fn new(
        jar: Arc<Jar>,
        base_url: Url,
        cookie_name: impl Into<String>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
        grace_window: Duration,
    ) -> Self {
        Self {
            jar,
            base_url,
            cookie_name: cookie_name.into(),
            store,
            clock,
            grace_window,
            grace_until: Mutex::new(None),
        }
    }

    /// Current anti-forgery token, if the cookie is present.
    pub fn csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?;
        cookie_value(cookies, &self.cookie_name)
    }

    /// Write the token into the jar, for servers that return it in the body
    /// without setting the cookie themselves.
    pub fn set_csrf_token(&self, token: &str) {
        let cookie = format!("{}={}; Path=/", self.cookie_name, token);
        self.jar.add_cookie_str(&cookie, &self.base_url);
    }

    /// Open the grace window. Called when a login or registration completes.
    pub fn mark_authenticated(&self) {
        let until = deadline_after(self.clock.now_ms(), self.grace_window);
        *self.grace_until.lock().unwrap_or_else(PoisonError::into_inner) = Some(until);
        self.store.set(GRACE_KEY, &until);
        tracing::debug!(grace_until = until, "Authentication grace period started");
    }

    pub fn clear_grace(&self) {
        *self.grace_until.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.store.remove(GRACE_KEY);
    }

    /// Grace deadline in epoch milliseconds: the later of the in-memory copy
    /// and the stored marker, which another client in the scope may have moved.
    pub fn grace_until(&self) -> Option<u64> {
        let memory = *self.grace_until.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self.store.get::<u64>(GRACE_KEY);
        memory.max(stored)
    }

    /// Whether 401s should currently be treated as cookie propagation noise.
    pub fn in_grace(&self) -> bool {
        self.grace_until()
            .is_some_and(|until| self.clock.now_ms() < until)
    }
}

/// Find a cookie value in a `Cookie` header string (`a=1; b=2`).
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;

    fn token_store(clock: Arc<ManualClock>, store: SessionStore) -> TokenStore {
        TokenStore::new(
            Arc::new(Jar::default()),
            Url::parse("http://localhost:8080/api/").unwrap(),
            "csrf_token",
            store,
            clock,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_cookie_value_parsing() {
        assert_eq!(cookie_value("a=1; csrf_token=abc; b=2", "csrf_token").as_deref(), Some("abc"));
        assert_eq!(cookie_value("csrf_token=\"quoted\"", "csrf_token").as_deref(), Some("quoted"));
        assert_eq!(cookie_value("other_csrf_token=x", "csrf_token"), None);
        assert_eq!(cookie_value("csrf_token=", "csrf_token"), None);
    }

    #[test]
    fn test_csrf_token_roundtrips_through_jar() {
        let tokens = token_store(Arc::new(ManualClock::new(0)), SessionStore::default());
        assert!(tokens.csrf_token().is_none());

        tokens.set_csrf_token("tok-123");
        assert_eq!(tokens.csrf_token().as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_grace_window_expires() {
        let clock = Arc::new(ManualClock::new(10_000));
        let tokens = token_store(clock.clone(), SessionStore::default());
        assert!(!tokens.in_grace());

        tokens.mark_authenticated();
        assert!(tokens.in_grace());

        clock.advance(Duration::from_millis(4_999));
        assert!(tokens.in_grace());

        clock.advance(Duration::from_millis(1));
        assert!(!tokens.in_grace());
    }

    #[test]
    fn test_grace_survives_lost_memory_copy() {
        let clock = Arc::new(ManualClock::new(0));
        let store = SessionStore::new("tab-1");

        token_store(clock.clone(), store.clone()).mark_authenticated();

        // A fresh instance over the same scope (e.g. after a reload).
        let reloaded = token_store(clock.clone(), store.clone());
        assert!(reloaded.in_grace());

        // Another scope does not inherit it.
        let other_tab = token_store(clock, store.scoped("tab-2"));
        assert!(!other_tab.in_grace());
    }

    #[test]
    fn test_newer_stored_marker_wins() {
        let clock = Arc::new(ManualClock::new(0));
        let store = SessionStore::new("tab-1");
        let first = token_store(clock.clone(), store.clone());
        let second = token_store(clock.clone(), store);

        first.mark_authenticated();
        clock.advance(Duration::from_secs(3));
        second.mark_authenticated();

        assert_eq!(first.grace_until(), Some(8_000));
        clock.advance(Duration::from_secs(3));
        assert!(first.in_grace());
    }

    #[test]
    fn test_huge_grace_window_saturates() {
        let tokens = TokenStore::new(
            Arc::new(Jar::default()),
            Url::parse("http://localhost").unwrap(),
            "csrf_token",
            SessionStore::default(),
            Arc::new(ManualClock::new(1_000)),
            Duration::from_secs(u64::MAX),
        );
        tokens.mark_authenticated();
        assert_eq!(tokens.grace_until(), Some(u64::MAX));
        assert!(tokens.in_grace());
    }

    #[test]
    fn test_clear_grace() {
        let tokens = token_store(Arc::new(ManualClock::new(0)), SessionStore::default());
        tokens.mark_authenticated();
        tokens.clear_grace();
        assert!(!tokens.in_grace());
        assert!(tokens.grace_until().is_none());
    }
}
