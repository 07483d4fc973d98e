//! Session expiry, refresh and circuit breaker behavior end to end.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use session_pipeline::{ApiClient, CircuitState, ExpiryReason};

mod common;

use common::{MockRequest, MockResponse};

/// Backend whose session cookie becomes valid after a successful refresh.
async fn start_session_backend(
    refresh_succeeds: bool,
    refresh_hits: Arc<AtomicU32>,
) -> std::net::SocketAddr {
    common::start_programmable_backend(move |req: MockRequest| {
        let refresh_hits = refresh_hits.clone();
        async move {
            match req.path.as_str() {
                "/csrf-token" => MockResponse::ok(json!({ "csrf_token": "tok" }))
                    .with_header("Set-Cookie", "csrf_token=tok; Path=/"),
                "/auth/refresh" => {
                    refresh_hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    if refresh_succeeds {
                        MockResponse::ok(json!(null))
                            .with_header("Set-Cookie", "session=fresh; Path=/")
                    } else {
                        MockResponse::error(401, "Refresh token expired", "Unauthorized")
                    }
                }
                "/auth/login" => MockResponse::error(401, "unauthorized", "Bad credentials"),
                _ if req.cookie("session").as_deref() == Some("fresh") => {
                    MockResponse::ok(json!({ "path": req.path }))
                }
                _ => MockResponse::error(401, "Session expired", "Unauthorized"),
            }
        }
    })
    .await
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let refresh_hits = Arc::new(AtomicU32::new(0));
    let addr = start_session_backend(true, refresh_hits.clone()).await;
    let client = ApiClient::new(common::config_for(addr)).unwrap();
    let mut expired = client.subscribe_session_expired();

    let body = json!({ "n": 1 });
    let (a, b) = tokio::join!(
        client.get::<Value>("/profile"),
        client.post::<Value, _>("/items", &body),
    );

    assert_eq!(a.unwrap()["path"], "/profile");
    assert_eq!(b.unwrap()["path"], "/items");
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 1);
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    assert!(!client.is_refreshing());
    assert!(expired.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_refreshes_open_breaker() {
    let refresh_hits = Arc::new(AtomicU32::new(0));
    let addr = start_session_backend(false, refresh_hits.clone()).await;
    let client = ApiClient::new(common::config_for(addr)).unwrap();
    let mut expired = client.subscribe_session_expired();

    for attempt in 1..=3 {
        let err = client.get::<Value>("/profile").await.unwrap_err();
        assert!(err.api().unwrap().is_unauthorized());
        assert_eq!(refresh_hits.load(Ordering::SeqCst), attempt);

        let event = tokio::time::timeout(Duration::from_secs(1), expired.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.reason, ExpiryReason::RefreshFailed);
        assert_eq!(event.path, "/profile");
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);

    // Fourth 401 short-circuits without touching the refresh endpoint.
    let err = client.get::<Value>("/orders").await.unwrap_err();
    assert!(err.api().unwrap().is_unauthorized());
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 3);

    let event = tokio::time::timeout(Duration::from_secs(1), expired.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.reason, ExpiryReason::CircuitOpen);
    assert_eq!(event.path, "/orders");

    // A completed login closes the breaker again.
    client.mark_authenticated();
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_grace_period_suppresses_expiry_signal() {
    let refresh_hits = Arc::new(AtomicU32::new(0));
    let addr = start_session_backend(false, refresh_hits.clone()).await;
    let client = ApiClient::new(common::config_for(addr)).unwrap();
    let mut expired = client.subscribe_session_expired();

    client.mark_authenticated();
    assert!(client.in_grace_period());

    let err = client.get::<Value>("/profile").await.unwrap_err();
    assert!(err.api().unwrap().is_unauthorized());
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 1);

    let received = tokio::time::timeout(Duration::from_millis(200), expired.recv()).await;
    assert!(received.is_err());
}

#[tokio::test]
async fn test_login_view_suppresses_expiry_signal() {
    let refresh_hits = Arc::new(AtomicU32::new(0));
    let addr = start_session_backend(false, refresh_hits.clone()).await;
    let client = ApiClient::new(common::config_for(addr)).unwrap();
    let mut expired = client.subscribe_session_expired();

    client.set_on_login_view(true);
    let _ = client.get::<Value>("/profile").await.unwrap_err();

    let received = tokio::time::timeout(Duration::from_millis(200), expired.recv()).await;
    assert!(received.is_err());
}

#[tokio::test]
async fn test_auth_path_401_returned_directly() {
    let refresh_hits = Arc::new(AtomicU32::new(0));
    let addr = start_session_backend(true, refresh_hits.clone()).await;
    let client = ApiClient::new(common::config_for(addr)).unwrap();

    let err = client
        .post::<Value, _>("/auth/login", &json!({ "user": "a", "password": "b" }))
        .await
        .unwrap_err();

    assert_eq!(err.api().unwrap().message, "Bad credentials");
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_cookie_after_refresh_gets_one_more_replay() {
    let refresh_hits = Arc::new(AtomicU32::new(0));
    let profile_hits = Arc::new(AtomicU32::new(0));
    let propagated = Arc::new(AtomicBool::new(false));
    let (rh, ph, p) = (refresh_hits.clone(), profile_hits.clone(), propagated.clone());

    let addr = common::start_programmable_backend(move |req: MockRequest| {
        let (rh, ph, p) = (rh.clone(), ph.clone(), p.clone());
        async move {
            match req.path.as_str() {
                "/csrf-token" => MockResponse::ok(json!({ "csrf_token": "tok" }))
                    .with_header("Set-Cookie", "csrf_token=tok; Path=/"),
                "/auth/refresh" => {
                    rh.fetch_add(1, Ordering::SeqCst);
                    MockResponse::ok(json!(null))
                }
                _ => {
                    // The first replay still sees the old session; later ones succeed.
                    let n = ph.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        MockResponse::error(401, "Session expired", "Unauthorized")
                    } else {
                        p.store(true, Ordering::SeqCst);
                        MockResponse::ok(json!({ "name": "ada" }))
                    }
                }
            }
        }
    })
    .await;

    let client = ApiClient::new(common::config_for(addr)).unwrap();
    let profile: Value = client.get("/profile").await.unwrap();

    assert_eq!(profile["name"], "ada");
    assert!(propagated.load(Ordering::SeqCst));
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 1);
    assert_eq!(profile_hits.load(Ordering::SeqCst), 3);
}
