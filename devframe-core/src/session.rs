//! In-memory proxy sessions.
//!
//! The store map is behind one `RwLock`, but each session's mutable state has its own
//! mutex so traffic for different sessions never contends. Immutable fields (id,
//! target, creation time) live outside that mutex.

use crate::error::{ProxyError, Result};
use crate::pattern::MockTable;
use crate::security::validate_target_url;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Path prefix under which a session's proxied traffic is served.
pub fn proxy_prefix(session_id: &str) -> String {
    format!("/proxy/{}", session_id)
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// Values are credentials; keep them out of logs.
impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// A single `Cookie` header value, or `None` when there is nothing to send.
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Every cookie must survive as part of a `Cookie` header: a non-empty token name and
/// a value of printable ASCII without `;`.
pub fn validate_cookies(cookies: &[Cookie]) -> Result<()> {
    for cookie in cookies {
        let name_ok = !cookie.name.is_empty()
            && cookie
                .name
                .bytes()
                .all(|b| b.is_ascii_graphic() && !b"=;,\"()<>@:/[]?{}".contains(&b));
        if !name_ok {
            return Err(ProxyError::InvalidCookie(format!(
                "'{}' is not a valid cookie name",
                cookie.name.escape_debug()
            )));
        }
        let value_ok = cookie
            .value
            .bytes()
            .all(|b| (0x20..0x7f).contains(&b) && b != b';');
        if !value_ok {
            return Err(ProxyError::InvalidCookie(format!(
                "value of '{}' must be printable ASCII without ';'",
                cookie.name
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub cookies: Vec<Cookie>,
    pub mocks: MockTable,
    pub auth_failed: bool,
}

#[derive(Debug)]
pub struct ProxySession {
    id: String,
    target_origin: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl ProxySession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Origin plus path prefix, without a trailing slash.
    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> &Mutex<SessionState> {
        &self.state
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub auth_failed: bool,
    pub cookie_count: usize,
    pub mock_route_count: usize,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Normalized target: scheme, host, port and path, never a trailing `/`.
pub fn normalize_target(target_url: &str) -> Result<String> {
    let url = validate_target_url(target_url)?;
    let path = url.path().trim_end_matches('/');
    Ok(format!("{}{}", url.origin().ascii_serialization(), path))
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<ProxySession>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, target_url: &str, cookies: Vec<Cookie>) -> Result<Arc<ProxySession>> {
        let target_origin = normalize_target(target_url)?;
        validate_cookies(&cookies)?;
        let id = Uuid::new_v4().simple().to_string();

        let session = Arc::new(ProxySession {
            id: id.clone(),
            target_origin,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                cookies,
                ..SessionState::default()
            }),
        });

        self.sessions.write().await.insert(id.clone(), session.clone());
        info!("Created session {} for {}", id, session.target_origin);
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ProxySession>> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn require(&self, id: &str) -> Result<Arc<ProxySession>> {
        self.get(id)
            .await
            .ok_or_else(|| ProxyError::SessionNotFound(id.to_string()))
    }

    /// Replace the cookie list wholesale. Clears the auth-failure flag.
    /// An invalid cookie leaves the session untouched.
    pub async fn replace_cookies(&self, id: &str, cookies: Vec<Cookie>) -> Result<()> {
        let session = self.require(id).await?;
        validate_cookies(&cookies)?;
        let mut state = session.state.lock().await;
        state.cookies = cookies;
        state.auth_failed = false;
        debug!("Session {} now carries {} cookies", id, state.cookies.len());
        Ok(())
    }

    /// Insert or replace mocks; returns the session's total mock count.
    /// All patterns are compiled before any is stored, so a bad pattern changes nothing.
    pub async fn set_mocks(&self, id: &str, mocks: Vec<(String, Value)>) -> Result<usize> {
        let session = self.require(id).await?;
        let mut state = session.state.lock().await;

        let mut staged = state.mocks.clone();
        for (pattern, response) in mocks {
            staged.insert(&pattern, response)?;
        }
        state.mocks = staged;
        Ok(state.mocks.len())
    }

    pub async fn clear_mocks(&self, id: &str) -> Result<()> {
        let session = self.require(id).await?;
        session.state.lock().await.mocks.clear();
        Ok(())
    }

    pub async fn status(&self, id: &str) -> Result<SessionStatus> {
        let session = self.require(id).await?;
        let state = session.state.lock().await;
        Ok(SessionStatus {
            auth_failed: state.auth_failed,
            cookie_count: state.cookies.len(),
            mock_route_count: state.mocks.len(),
            created_at: session.created_at.timestamp_millis(),
        })
    }

    /// Sticky until cookies are replaced. Returns false if the session is gone.
    pub async fn mark_auth_failed(&self, id: &str) -> bool {
        match self.get(id).await {
            Some(session) => {
                session.state.lock().await.auth_failed = true;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        match self.sessions.write().await.remove(id) {
            Some(_) => {
                info!("Removed session {}", id);
                Ok(())
            }
            None => Err(ProxyError::SessionNotFound(id.to_string())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Remove every session older than the TTL as of `now`.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return 0;
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| now.signed_duration_since(session.created_at) <= ttl);
        before - sessions.len()
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep_expired().await;
                if removed > 0 {
                    info!("Expired {} sessions ({} remain)", removed, self.len().await);
                } else {
                    debug!("Session sweep found nothing to expire");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_joins_pairs() {
        let cookies = vec![Cookie::new("a", "1"), Cookie::new("b", "2")];
        assert_eq!(cookie_header(&cookies).as_deref(), Some("a=1; b=2"));
        assert_eq!(cookie_header(&[]), None);
    }

    #[test]
    fn test_validate_cookies() {
        let good = [Cookie::new("sid", "abc.DEF-1%3D"), Cookie::new("b", "x y")];
        assert!(validate_cookies(&good).is_ok());
        assert!(validate_cookies(&[]).is_ok());

        for bad in [
            Cookie::new("b", "caf\u{e9}"),
            Cookie::new("b", "line\nbreak"),
            Cookie::new("b", "a;c=d"),
            Cookie::new("", "1"),
            Cookie::new("a=b", "1"),
            Cookie::new("two words", "1"),
        ] {
            let err = validate_cookies(&[Cookie::new("ok", "1"), bad]).unwrap_err();
            assert!(matches!(err, ProxyError::InvalidCookie(_)));
        }
    }

    #[test]
    fn test_cookie_debug_hides_value() {
        let rendered = format!("{:?}", Cookie::new("session_token", "abc123"));
        assert!(rendered.contains("session_token"));
        assert!(!rendered.contains("abc123"));
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(
            normalize_target("http://localhost:3000").unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_target("https://example.com/app/?x=1#top").unwrap(),
            "https://example.com/app"
        );
        assert!(normalize_target("ftp://example.com").is_err());
    }
}
