//! HTTP API: session management, the proxy route and crawl.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use devframe_core::config::ServerConfig;
use devframe_core::crawl::CrawlRequest;
use devframe_core::error::ProxyError;
use devframe_core::forward::{Forwarder, HttpUpstream, InboundRequest};
use devframe_core::session::{Cookie, SessionStore, proxy_prefix};
use devframe_scanner::result::CrawlResult;
use devframe_scanner::{BrowserDriver, Crawler, CrawlerConfig, ScanError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub forwarder: Arc<Forwarder>,
    pub crawler: Arc<Crawler>,
    pub config: Arc<ServerConfig>,
}

/// Process-wide services, created once at startup and torn down at shutdown.
pub struct App {
    state: AppState,
    driver: Arc<dyn BrowserDriver>,
    sweeper: JoinHandle<()>,
}

impl App {
    /// Must run inside a Tokio runtime; starts the session sweeper.
    pub fn init(
        config: ServerConfig,
        driver: Arc<dyn BrowserDriver>,
        crawler_config: CrawlerConfig,
    ) -> Result<Self, ProxyError> {
        let store = Arc::new(SessionStore::new(config.session_ttl));
        let upstream = Arc::new(HttpUpstream::new(config.forward_timeout)?);
        let forwarder = Arc::new(Forwarder::new(store.clone(), upstream));
        let crawler = Arc::new(Crawler::with_config(driver.clone(), crawler_config)?);
        let sweeper = store.clone().spawn_sweeper(config.sweep_interval);

        Ok(Self {
            state: AppState {
                store,
                forwarder,
                crawler,
                config: Arc::new(config),
            },
            driver,
            sweeper,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves. Teardown runs whether or not serving failed.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let outcome = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        if let Err(ref e) = outcome {
            warn!("Server stopped with an error: {}", e);
        }
        self.teardown().await;
        outcome
    }

    /// Stop the sweeper and release the browser.
    pub async fn teardown(self) {
        self.sweeper.abort();
        if let Err(e) = self.driver.close().await {
            warn!("Failed to close browser: {}", e);
        }
        info!("Shutdown complete");
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit;

    Router::new()
        .route("/health", get(health))
        .route("/proxy/session", post(create_session))
        .route("/proxy/session/:id", axum::routing::delete(delete_session))
        .route("/proxy/session/:id/cookies", put(replace_cookies))
        .route(
            "/proxy/session/:id/mock",
            post(set_mocks).delete(clear_mocks),
        )
        .route("/proxy/session/:id/status", get(session_status))
        .route("/proxy/:id", any(proxy))
        .route("/proxy/:id/", any(proxy))
        .route("/proxy/:id/*path", any(proxy))
        .route("/crawl", post(crawl))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Proxy(ProxyError),
    BadRequest(String),
}

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        ApiError::Proxy(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Proxy(e) => match e {
                ProxyError::InvalidTarget(_)
                | ProxyError::InvalidCookie(_)
                | ProxyError::InvalidPattern(_)
                | ProxyError::Scan(ScanError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
                ProxyError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Proxy(ProxyError::SessionNotFound(_)) => "Session not found".to_string(),
            ApiError::Proxy(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Session management
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub id: String,
    pub proxy_url_prefix: String,
    pub target_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CookiesRequest {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Deserialize)]
pub struct MockSpec {
    pub pattern: String,
    pub response: Value,
}

#[derive(Debug, Deserialize)]
pub struct MocksRequest {
    #[serde(default)]
    pub mocks: Vec<MockSpec>,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "sessions": state.store.len().await }))
}

async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<CreateSessionResponse> {
    let Json(request) = payload?;
    let url = request.url.unwrap_or_default();
    let session = state.store.create(&url, request.cookies).await?;

    Ok(Json(CreateSessionResponse {
        id: session.id().to_string(),
        proxy_url_prefix: proxy_prefix(session.id()),
        target_url: session.target_origin().to_string(),
    }))
}

async fn replace_cookies(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CookiesRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    state.store.replace_cookies(&id, request.cookies).await?;
    Ok(Json(json!({ "success": true })))
}

async fn set_mocks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<MocksRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    let mocks = request
        .mocks
        .into_iter()
        .map(|m| (m.pattern, m.response))
        .collect();
    let count = state.store.set_mocks(&id, mocks).await?;
    Ok(Json(json!({ "success": true, "count": count })))
}

async fn clear_mocks(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.store.clear_mocks(&id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<devframe_core::session::SessionStatus> {
    Ok(Json(state.store.status(&id).await?))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.store.remove(&id).await?;
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Proxy
// ============================================================================

/// Everything after `/proxy/{id}`, taken from the raw URI so percent-encoding survives.
fn forwarded_path(uri: &Uri, session_id: &str) -> String {
    let raw = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let rest = raw
        .strip_prefix(proxy_prefix(session_id).as_str())
        .unwrap_or("/");
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    }
}

async fn proxy(
    State(state): State<AppState>,
    Path(params): Path<Vec<(String, String)>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(id) = params
        .into_iter()
        .find(|(name, _)| name == "id")
        .map(|(_, value)| value)
    else {
        return ApiError::BadRequest("missing session id".to_string()).into_response();
    };

    let request = InboundRequest {
        method,
        path_and_query: forwarded_path(&uri, &id),
        headers,
        body,
    };
    let response = state.forwarder.forward(&id, request).await;
    (response.status, response.headers, response.body).into_response()
}

// ============================================================================
// Crawl
// ============================================================================

async fn crawl(
    State(state): State<AppState>,
    payload: Result<Json<CrawlRequest>, JsonRejection>,
) -> ApiResult<CrawlResult> {
    let Json(request) = payload?;
    let (start, options) = request.into_options(&state.config.public_base())?;
    let result = state
        .crawler
        .discover(start.as_str(), options)
        .await
        .map_err(ProxyError::from)?;
    Ok(Json(result))
}
