//! Session-scoped request forwarding.
//!
//! [`Forwarder::forward`] never returns an error: missing sessions and upstream
//! failures become synthetic JSON responses so the proxy route can always reply.

use crate::error::{ProxyError, Result};
use crate::session::{SessionStore, cookie_header};
use async_trait::async_trait;
use bytes::Bytes;
use devframe_scanner::ScanError;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, redirect};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MOCK_MARKER_HEADER: &str = "x-devframe-mock";

/// Inbound headers that are passed on to the target; everything else is dropped.
const FORWARDED_REQUEST_HEADERS: &[&str] =
    &["accept", "accept-language", "content-type", "content-length"];

/// Upstream response headers that are never passed back.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "x-frame-options",
    "content-security-policy",
    "content-security-policy-report-only",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "content-encoding",
];

const LOGIN_PATH_MARKERS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/auth",
    "/sso",
    "/oauth",
    "/cas/login",
];

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Outbound fetch primitive. Implementations must not follow redirects.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(ScanError::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let response = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(format!("{}: {}", request.url, e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(format!("{}: {}", request.url, e)))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// A request as received on `/proxy/{id}/...`, with the prefix already removed.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path relative to the session prefix, optionally with `?query`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn get(path_and_query: &str) -> Self {
        Self {
            method: Method::GET,
            path_and_query: path_and_query.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn json_error(status: StatusCode, message: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            status,
            headers,
            body: Bytes::from(body),
        }
    }

    /// String payloads are served as HTML, anything else as JSON.
    pub fn mock(payload: &Value) -> Self {
        let (content_type, body) = match payload {
            Value::String(text) => ("text/html; charset=utf-8", text.clone()),
            other => ("application/json", other.to_string()),
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(MOCK_MARKER_HEADER, HeaderValue::from_static("true"));
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));
        Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body),
        }
    }
}

pub struct Forwarder {
    store: Arc<SessionStore>,
    upstream: Arc<dyn Upstream>,
}

impl Forwarder {
    pub fn new(store: Arc<SessionStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self { store, upstream }
    }

    pub async fn forward(&self, session_id: &str, request: InboundRequest) -> ProxyResponse {
        let Some(session) = self.store.get(session_id).await else {
            return ProxyResponse::json_error(StatusCode::NOT_FOUND, "Session not found");
        };

        let path_and_query = normalize_path(&request.path_and_query);
        let path = path_only(&path_and_query);

        // Snapshot under the session lock; no lock is held across network I/O.
        let (mock, cookies) = {
            let state = session.state().lock().await;
            (state.mocks.lookup(path).cloned(), cookie_header(&state.cookies))
        };

        if let Some(payload) = mock {
            debug!("Session {} served mock for {}", session_id, path);
            return ProxyResponse::mock(&payload);
        }

        let url = format!("{}{}", session.target_origin(), path_and_query);
        let mut headers = HeaderMap::new();
        for name in FORWARDED_REQUEST_HEADERS {
            if let Some(value) = request.headers.get(*name) {
                headers.insert(HeaderName::from_static(*name), value.clone());
            }
        }
        if let Some(cookies) = cookies {
            // Never forward without the session's credentials.
            let Ok(value) = HeaderValue::from_str(&cookies) else {
                warn!("Session {} has cookies that are not valid header text", session_id);
                return ProxyResponse::json_error(
                    StatusCode::BAD_REQUEST,
                    "Session cookies are not valid header text",
                );
            };
            headers.insert(header::COOKIE, value);
        }

        let upstream = UpstreamRequest {
            method: request.method,
            url: url.clone(),
            headers,
            body: request.body,
        };
        let response = match self.upstream.send(upstream).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Forwarding to {} failed: {}", url, e);
                return ProxyResponse::json_error(StatusCode::BAD_GATEWAY, &e.to_string());
            }
        };

        if is_auth_failure(response.status, &response.headers) {
            info!(
                "Auth failure detected for session {} ({} from {})",
                session_id, response.status, url
            );
            self.store.mark_auth_failed(session_id).await;
        }

        let mut headers = sanitize_response_headers(&response.headers);
        let body = if is_html(&headers) {
            let html = String::from_utf8_lossy(&response.body);
            Bytes::from(inject_base_href(&html, session.target_origin()))
        } else {
            response.body
        };
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));

        ProxyResponse {
            status: response.status,
            headers,
            body,
        }
    }
}

fn normalize_path(path_and_query: &str) -> String {
    if path_and_query.starts_with('/') {
        path_and_query.to_string()
    } else {
        format!("/{}", path_and_query)
    }
}

fn path_only(path_and_query: &str) -> &str {
    path_and_query
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(path_and_query)
}

/// 401/403, or a redirect whose `Location` looks like a login page.
pub fn is_auth_failure(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return true;
    }
    if !status.is_redirection() {
        return false;
    }

    headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(|location| {
            let location = location.to_ascii_lowercase();
            LOGIN_PATH_MARKERS
                .iter()
                .any(|marker| location.contains(marker))
        })
        .unwrap_or(false)
}

pub fn sanitize_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
}

/// Insert `<base href="{target}/">` right after the first `<head>` tag, or prepend it.
pub fn inject_base_href(html: &str, target_origin: &str) -> String {
    let tag = format!("<base href=\"{}/\">", target_origin);

    match find_head_end(html) {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..at]);
            out.push_str(&tag);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{}{}", tag, html),
    }
}

/// Byte offset just past the opening head tag (`<head>` or `<head ...>`), any case.
fn find_head_end(html: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find("<head") {
        let start = from + rel;
        let after = start + "<head".len();
        match lower.as_bytes().get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() => {
                return lower[after..].find('>').map(|end| after + end + 1);
            }
            _ => from = after,
        }
    }
    None
}
