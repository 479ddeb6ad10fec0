// Tests for session-scoped forwarding

use async_trait::async_trait;
use bytes::Bytes;
use devframe_core::error::{ProxyError, Result};
use devframe_core::forward::{
    Forwarder, HttpUpstream, InboundRequest, MOCK_MARKER_HEADER, Upstream, UpstreamRequest,
    UpstreamResponse,
};
use devframe_core::session::{Cookie, SessionStore};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every outbound request and answers with a fixed response.
struct SpyUpstream {
    calls: Mutex<Vec<UpstreamRequest>>,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl SpyUpstream {
    fn ok(body: &'static str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for SpyUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        self.calls.lock().unwrap().push(request);
        Ok(UpstreamResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        })
    }
}

struct DownUpstream;

#[async_trait]
impl Upstream for DownUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        Err(ProxyError::UpstreamUnreachable(format!(
            "{}: connection refused",
            request.url
        )))
    }
}

fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(Duration::from_secs(3600)))
}

fn http_upstream() -> Arc<dyn Upstream> {
    Arc::new(HttpUpstream::new(Duration::from_secs(5)).unwrap())
}

fn body_json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

// ============================================================================
// Mocks and missing sessions
// ============================================================================

#[tokio::test]
async fn test_exact_mock_never_reaches_upstream() {
    let store = store();
    let spy = Arc::new(SpyUpstream::ok("real"));
    let forwarder = Forwarder::new(store.clone(), spy.clone());

    let session = store.create("http://localhost:3000", vec![]).await.unwrap();
    store
        .set_mocks(
            session.id(),
            vec![("/api/user".to_string(), json!({"name": "Ada"}))],
        )
        .await
        .unwrap();

    let response = forwarder
        .forward(session.id(), InboundRequest::get("/api/user?fields=all"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body_json(&response.body), json!({"name": "Ada"}));
    assert_eq!(response.headers[MOCK_MARKER_HEADER], "true");
    assert_eq!(response.headers["content-type"], "application/json");
    assert!(spy.calls().is_empty());
}

#[tokio::test]
async fn test_glob_mock_serves_html_string() {
    let store = store();
    let spy = Arc::new(SpyUpstream::ok("real"));
    let forwarder = Forwarder::new(store.clone(), spy.clone());

    let session = store.create("http://localhost:3000", vec![]).await.unwrap();
    store
        .set_mocks(
            session.id(),
            vec![("/reports/:id".to_string(), json!("<h1>Report</h1>"))],
        )
        .await
        .unwrap();

    let response = forwarder
        .forward(session.id(), InboundRequest::get("/reports/42"))
        .await;
    assert_eq!(response.body, Bytes::from("<h1>Report</h1>"));
    assert!(
        response.headers["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    // Unmatched paths still go out.
    forwarder
        .forward(session.id(), InboundRequest::get("/reports/42/edit"))
        .await;
    assert_eq!(spy.calls().len(), 1);
}

#[tokio::test]
async fn test_unknown_session_is_404_without_upstream_call() {
    let spy = Arc::new(SpyUpstream::ok("real"));
    let forwarder = Forwarder::new(store(), spy.clone());

    let response = forwarder.forward("missing", InboundRequest::get("/")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(body_json(&response.body)["error"].is_string());
    assert!(spy.calls().is_empty());
}

#[tokio::test]
async fn test_upstream_failure_is_502() {
    let store = store();
    let forwarder = Forwarder::new(store.clone(), Arc::new(DownUpstream));
    let session = store.create("http://localhost:3000", vec![]).await.unwrap();

    let response = forwarder.forward(session.id(), InboundRequest::get("/")).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    let body = body_json(&response.body);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

// ============================================================================
// Outbound request shape
// ============================================================================

#[tokio::test]
async fn test_outbound_request_headers_are_whitelisted() {
    let store = store();
    let spy = Arc::new(SpyUpstream::ok("ok"));
    let forwarder = Forwarder::new(store.clone(), spy.clone());
    let session = store
        .create(
            "http://localhost:3000/app/",
            vec![Cookie::new("sid", "1"), Cookie::new("csrf", "2")],
        )
        .await
        .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert("accept", HeaderValue::from_static("text/html"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("cookie", HeaderValue::from_static("browser=leak"));
    headers.insert("authorization", HeaderValue::from_static("Bearer x"));
    headers.insert("host", HeaderValue::from_static("127.0.0.1:4000"));

    forwarder
        .forward(
            session.id(),
            InboundRequest {
                method: Method::POST,
                path_and_query: "/orders?page=2".to_string(),
                headers,
                body: Bytes::from_static(b"{\"x\":1}"),
            },
        )
        .await;

    let calls = spy.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.method, Method::POST);
    assert_eq!(call.url, "http://localhost:3000/app/orders?page=2");
    assert_eq!(call.headers["cookie"], "sid=1; csrf=2");
    assert_eq!(call.headers["accept"], "text/html");
    assert_eq!(call.headers["content-type"], "application/json");
    assert!(call.headers.get("authorization").is_none());
    assert!(call.headers.get("host").is_none());
    assert_eq!(call.body, Bytes::from_static(b"{\"x\":1}"));
}

#[tokio::test]
async fn test_no_cookie_header_without_cookies() {
    let store = store();
    let spy = Arc::new(SpyUpstream::ok("ok"));
    let forwarder = Forwarder::new(store.clone(), spy.clone());
    let session = store.create("http://localhost:3000", vec![]).await.unwrap();

    forwarder.forward(session.id(), InboundRequest::get("/")).await;
    assert!(spy.calls()[0].headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_unencodable_cookie_is_rejected_at_creation() {
    let store = store();
    let err = store
        .create(
            "http://localhost:3000",
            vec![Cookie::new("a", "1"), Cookie::new("b", "caf\u{e9}")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidCookie(_)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_rejected_cookie_replacement_keeps_previous_cookies() {
    let store = store();
    let spy = Arc::new(SpyUpstream::ok("ok"));
    let forwarder = Forwarder::new(store.clone(), spy.clone());
    let session = store
        .create("http://localhost:3000", vec![Cookie::new("sid", "1")])
        .await
        .unwrap();

    let err = store
        .replace_cookies(session.id(), vec![Cookie::new("sid", "2\nSet-Cookie: x=y")])
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidCookie(_)));

    forwarder.forward(session.id(), InboundRequest::get("/")).await;
    assert_eq!(spy.calls()[0].headers["cookie"], "sid=1");
}

#[tokio::test]
async fn test_session_with_unencodable_cookies_is_not_forwarded() {
    let store = store();
    let spy = Arc::new(SpyUpstream::ok("ok"));
    let forwarder = Forwarder::new(store.clone(), spy.clone());
    let session = store
        .create("http://localhost:3000", vec![Cookie::new("a", "1")])
        .await
        .unwrap();
    session
        .state()
        .lock()
        .await
        .cookies
        .push(Cookie::new("b", "caf\u{e9}"));

    let response = forwarder.forward(session.id(), InboundRequest::get("/")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(body_json(&response.body)["error"].is_string());
    assert!(spy.calls().is_empty());
}

// ============================================================================
// End-to-end against a real upstream
// ============================================================================

#[tokio::test]
async fn test_cookie_injected_and_frame_header_rewritten() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "session_token=abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-frame-options", "DENY")
                .insert_header("content-security-policy", "frame-ancestors 'none'")
                .insert_header("content-type", "text/plain")
                .set_body_string("hello"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    let session = store
        .create(&upstream.uri(), vec![Cookie::new("session_token", "abc")])
        .await
        .unwrap();

    let response = forwarder.forward(session.id(), InboundRequest::get("/")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["x-frame-options"], "ALLOWALL");
    assert!(response.headers.get("content-security-policy").is_none());
    assert_eq!(response.body, Bytes::from("hello"));
}

#[tokio::test]
async fn test_login_redirect_marks_auth_failed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
        .mount(&upstream)
        .await;

    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    let session = store.create(&upstream.uri(), vec![]).await.unwrap();

    let response = forwarder
        .forward(session.id(), InboundRequest::get("/dashboard"))
        .await;

    // The redirect is passed through, not followed.
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.headers["location"], "/login");
    assert!(store.status(session.id()).await.unwrap().auth_failed);
}

#[tokio::test]
async fn test_auth_failed_is_sticky_until_cookies_replaced() {
    let upstream = MockServer::start().await;
    Mock::given(path("/private"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;
    Mock::given(path("/public"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    let session = store.create(&upstream.uri(), vec![]).await.unwrap();

    forwarder
        .forward(session.id(), InboundRequest::get("/private"))
        .await;
    forwarder
        .forward(session.id(), InboundRequest::get("/public"))
        .await;
    assert!(store.status(session.id()).await.unwrap().auth_failed);

    store
        .replace_cookies(session.id(), vec![Cookie::new("sid", "fresh")])
        .await
        .unwrap();
    assert!(!store.status(session.id()).await.unwrap().auth_failed);
}

#[tokio::test]
async fn test_html_gets_base_href() {
    let upstream = MockServer::start().await;
    Mock::given(path("/app/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>App</title></head><body><img src=\"/logo.png\"></body></html>",
            "text/html; charset=utf-8",
        ))
        .mount(&upstream)
        .await;

    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    let target = format!("{}/app", upstream.uri());
    let session = store.create(&target, vec![]).await.unwrap();

    let response = forwarder
        .forward(session.id(), InboundRequest::get("/page"))
        .await;

    let html = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(html.starts_with(&format!(
        "<html><head><base href=\"{}/app/\"><title>",
        upstream.uri()
    )));
    assert!(response.headers.get("content-length").is_none());
}

#[tokio::test]
async fn test_binary_body_passes_through() {
    let upstream = MockServer::start().await;
    let png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x00, 0xff];
    Mock::given(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png.clone(), "image/png"))
        .mount(&upstream)
        .await;

    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    let session = store.create(&upstream.uri(), vec![]).await.unwrap();

    let response = forwarder
        .forward(session.id(), InboundRequest::get("/logo.png"))
        .await;

    assert_eq!(response.body.to_vec(), png);
    assert_eq!(response.headers["content-type"], "image/png");
}

#[tokio::test]
async fn test_query_string_reaches_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(path("/search"))
        .and(query_param("q", "shoes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("found"))
        .expect(1)
        .mount(&upstream)
        .await;

    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    let session = store.create(&upstream.uri(), vec![]).await.unwrap();

    let response = forwarder
        .forward(session.id(), InboundRequest::get("/search?q=shoes"))
        .await;
    assert_eq!(response.body, Bytes::from("found"));
}

#[tokio::test]
async fn test_unreachable_upstream_is_502() {
    let store = store();
    let forwarder = Forwarder::new(store.clone(), http_upstream());
    // Nothing listens on port 9 locally.
    let session = store.create("http://127.0.0.1:9", vec![]).await.unwrap();

    let response = forwarder.forward(session.id(), InboundRequest::get("/")).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
}
