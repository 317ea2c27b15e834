//! Refresh-and-retry behavior of the session guard against a mock service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stockly_core::api::{ApiClient, ApiError};
use stockly_core::auth::{
    AuthEvent, AuthEvents, CredentialStore, EventNavigator, MemoryCredentialStore, Navigator,
    SessionContext, TokenKind, SIGN_IN_PATH,
};
use stockly_core::models::CredentialPair;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

struct Harness {
    server: MockServer,
    client: ApiClient,
    store: Arc<MemoryCredentialStore>,
    navigator: Arc<EventNavigator>,
    events: AuthEvents,
}

async fn harness(tokens: Option<(&str, &str)>, location: &str) -> Harness {
    harness_with_timeout(tokens, location, Duration::from_secs(5)).await
}

async fn harness_with_timeout(tokens: Option<(&str, &str)>, location: &str, timeout: Duration) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(match tokens {
        Some((access, refresh)) => MemoryCredentialStore::with_pair(&CredentialPair::new(access, refresh)),
        None => MemoryCredentialStore::new(),
    });
    let events = AuthEvents::new();
    let navigator = Arc::new(EventNavigator::new(location, events.clone()));
    let session = SessionContext::new(store.clone(), events.clone(), navigator.clone());
    let client = ApiClient::builder()
        .base_url(server.uri())
        .session(session)
        .timeout(timeout)
        .build()
        .expect("client should build");
    Harness {
        server,
        client,
        store,
        navigator,
        events,
    }
}

const HISTORY: &str = "/api/images/history";

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid or expired access token" }))
}

fn refreshed(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer"
    }))
}

fn no_authorization(request: &Request) -> bool {
    !request.headers.contains_key("authorization")
}

fn sign_in_prompts(rx: &mut tokio::sync::broadcast::Receiver<AuthEvent>) -> usize {
    std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|event| *event == AuthEvent::SignInRequired)
        .count()
}

/// Accepts the access token but fails to persist a refresh token.
struct RefreshWriteFails(MemoryCredentialStore);

impl CredentialStore for RefreshWriteFails {
    fn get(&self, kind: TokenKind) -> anyhow::Result<Option<String>> {
        self.0.get(kind)
    }

    fn set(&self, kind: TokenKind, value: &str) -> anyhow::Result<()> {
        match kind {
            TokenKind::Access => self.0.set(kind, value),
            TokenKind::Refresh => anyhow::bail!("keychain locked"),
        }
    }

    fn remove(&self, kind: TokenKind) -> anyhow::Result<()> {
        self.0.remove(kind)
    }
}

#[tokio::test]
async fn test_attaches_stored_access_token() {
    let h = harness(Some(("A", "R")), "/gallery").await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.server)
        .await;

    let images = h.client.images().recent().await.expect("history should load");
    assert!(images.is_empty());
}

#[tokio::test]
async fn test_missing_token_sends_unauthenticated_request() {
    let h = harness(None, "/").await;
    Mock::given(method("GET"))
        .and(path("/api/auth/google/url"))
        .and(no_authorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth_url": "https://accounts.google.com/o/oauth2/v2/auth" })))
        .expect(1)
        .mount(&h.server)
        .await;

    let url = h.client.auth().google_auth_url().await.expect("url should load");
    assert!(url.auth_url.starts_with("https://accounts.google.com"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried_once() {
    let h = harness(Some(("A", "R")), "/gallery").await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer A"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refresh_token": "R" })))
        .and(no_authorization)
        .respond_with(refreshed("A2", "R2"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.server)
        .await;

    h.client.images().recent().await.expect("request should recover");

    assert_eq!(h.store.pair().unwrap(), Some(CredentialPair::new("A2", "R2")));
    assert_eq!(h.navigator.current_path(), "/gallery");
}

#[tokio::test]
async fn test_retried_request_is_not_refreshed_again() {
    let h = harness(Some(("A", "R")), "/gallery").await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2"))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.client.images().recent().await.expect_err("second 401 should propagate");

    assert!(err.is_unauthorized(), "unexpected error: {err}");
    assert_eq!(h.store.pair().unwrap(), Some(CredentialPair::new("A2", "R2")));
}

#[tokio::test]
async fn test_missing_refresh_token_clears_store_and_requires_sign_in() {
    let h = harness(None, "/gallery").await;
    h.store.set(TokenKind::Access, "A").unwrap();
    let mut rx = h.events.subscribe();
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.client.images().recent().await.expect_err("should fail");

    assert!(matches!(err, ApiError::Unauthorized(_)), "unexpected error: {err}");
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_path(), SIGN_IN_PATH);
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::SignInRequired);
}

#[tokio::test]
async fn test_no_tokens_and_401_navigates_to_sign_in() {
    let h = harness(None, "/").await;
    Mock::given(method("DELETE"))
        .and(path("/api/images/img-1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.client.images().delete("img-1").await.expect_err("should fail");

    assert!(err.requires_sign_in());
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_path(), SIGN_IN_PATH);
}

#[tokio::test]
async fn test_refresh_failure_clears_store_and_returns_refresh_error() {
    let h = harness(Some(("A", "R")), "/profile").await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid refresh token" })))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.client.images().recent().await.expect_err("should fail");

    match err {
        ApiError::RefreshFailed(inner) => {
            assert_eq!(inner.to_string(), "Unauthorized: Invalid refresh token");
        }
        other => panic!("expected refresh error, got {other}"),
    }
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_path(), SIGN_IN_PATH);
}

#[tokio::test]
async fn test_refresh_failure_on_sign_in_view_does_not_navigate() {
    let h = harness(Some(("A", "R")), SIGN_IN_PATH).await;
    let mut rx = h.events.subscribe();
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(unauthorized())
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.client.auth().me().await.expect_err("should fail");

    assert!(matches!(err, ApiError::RefreshFailed(_)));
    assert!(h.store.is_empty());
    assert!(rx.try_recv().is_err(), "no redirect expected while on sign-in");
}

#[tokio::test]
async fn test_upstream_errors_pass_through_without_refresh() {
    let h = harness(Some(("A", "R")), "/").await;
    Mock::given(method("POST"))
        .and(path("/api/images/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "Image generation failed: quota" })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .client
        .images()
        .generate("a lighthouse at dusk", None)
        .await
        .expect_err("should fail");

    assert!(matches!(err, ApiError::ServerError(ref m) if m.contains("quota")));
    assert_eq!(h.store.pair().unwrap(), Some(CredentialPair::new("A", "R")));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let h = harness(Some(("A", "R")), "/gallery").await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer A"))
        .respond_with(unauthorized())
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2").set_delay(Duration::from_millis(50)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;

    let images = h.client.images();
    let results = futures::future::join_all((0..4).map(|_| images.recent())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(h.store.pair().unwrap(), Some(CredentialPair::new("A2", "R2")));
}

#[tokio::test]
async fn test_logout_clears_tokens_without_network() {
    let h = harness(Some(("A", "R")), "/profile").await;
    let mut rx = h.events.subscribe();

    h.client.auth().logout().expect("logout should succeed");

    assert!(h.store.is_empty());
    assert!(!h.client.auth().is_authenticated());
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::Logout);
    let received = h.server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_concurrent_401s_share_refresh_failure() {
    let h = harness(Some(("A", "R")), "/gallery").await;
    let mut rx = h.events.subscribe();
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(unauthorized())
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "detail": "Invalid refresh token" }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let images = h.client.images();
    let results = futures::future::join_all((0..4).map(|_| images.recent())).await;

    for result in results {
        match result {
            Err(ApiError::RefreshFailed(inner)) => {
                assert_eq!(inner.to_string(), "Unauthorized: Invalid refresh token");
            }
            other => panic!("expected refresh error, got {:?}", other.map(|_| ())),
        }
    }
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_path(), SIGN_IN_PATH);
    assert_eq!(sign_in_prompts(&mut rx), 1);
}

#[tokio::test]
async fn test_refresh_network_error_clears_store() {
    let h = harness_with_timeout(Some(("A", "R")), "/gallery", Duration::from_millis(200)).await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2").set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;

    let err = h.client.images().recent().await.expect_err("should fail");

    match err {
        ApiError::RefreshFailed(inner) => {
            assert!(matches!(inner.as_ref(), ApiError::NetworkError(_)), "got {inner}");
        }
        other => panic!("expected refresh error, got {other}"),
    }
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_path(), SIGN_IN_PATH);
}

#[tokio::test]
async fn test_unstorable_refresh_clears_partial_pair() {
    let server = MockServer::start().await;
    let store = Arc::new(RefreshWriteFails(MemoryCredentialStore::with_pair(&CredentialPair::new(
        "A", "R",
    ))));
    let events = AuthEvents::new();
    let navigator = Arc::new(EventNavigator::new("/gallery", events.clone()));
    let session = SessionContext::new(store.clone(), events, navigator.clone());
    let client = ApiClient::builder()
        .base_url(server.uri())
        .session(session)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client should build");

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refreshed("A2", "R2"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.images().recent().await.expect_err("should fail");

    match err {
        ApiError::RefreshFailed(inner) => assert!(matches!(inner.as_ref(), ApiError::Storage(_))),
        other => panic!("expected refresh error, got {other}"),
    }
    assert!(store.0.is_empty());
    assert_eq!(navigator.current_path(), SIGN_IN_PATH);
}
