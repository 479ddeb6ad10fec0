//! Headless browser access.
//!
//! The crawler talks to [`BrowserDriver`] / [`BrowserPage`] only. [`ChromeDriver`] is
//! the production implementation: one Chromium process per driver, launched on first
//! use, relaunched when its CDP connection drops, and closed explicitly at shutdown.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A browser that can hand out fresh pages (tabs).
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a new blank page, launching the browser first if needed.
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;

    /// Tear the browser down. A later `new_page` launches a new one.
    async fn close(&self) -> Result<()>;
}

/// A single tab. Callers must `close` it when done.
#[async_trait]
pub trait BrowserPage: Send {
    /// Navigate and wait for the document to finish loading.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    async fn title(&mut self) -> Result<Option<String>>;

    /// Evaluate a script in the document context and return its JSON value.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    pub args: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            sandbox: true,
            args: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BrowserSettings {
    /// Use a specific Chromium binary; `~` is expanded.
    pub fn with_executable(mut self, path: &str) -> Self {
        let expanded = shellexpand::tilde(path);
        self.executable = Some(PathBuf::from(expanded.as_ref()));
        self
    }

    fn to_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder().request_timeout(self.request_timeout);

        if let Some(ref path) = self.executable {
            builder = builder.chrome_executable(path);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        for arg in &self.args {
            builder = builder.arg(arg);
        }

        builder.build().map_err(ScanError::Browser)
    }
}

struct LiveBrowser {
    browser: Browser,
    connected: Arc<AtomicBool>,
    handler: JoinHandle<()>,
}

/// Shared, lazily launched Chromium instance.
pub struct ChromeDriver {
    settings: BrowserSettings,
    live: Mutex<Option<LiveBrowser>>,
}

impl ChromeDriver {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            live: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(|live| live.connected.load(Ordering::SeqCst))
    }

    async fn launch(&self) -> Result<LiveBrowser> {
        let config = self.settings.to_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScanError::Browser(format!("Failed to launch browser: {}", e)))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!("Browser handler stopped");
        });

        info!("Launched headless browser");
        Ok(LiveBrowser {
            browser,
            connected,
            handler,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let mut live = self.live.lock().await;

        let usable = live
            .as_ref()
            .is_some_and(|l| l.connected.load(Ordering::SeqCst));
        if !usable {
            if let Some(stale) = live.take() {
                warn!("Browser disconnected, relaunching");
                stale.handler.abort();
            }
            *live = Some(self.launch().await?);
        }

        let browser = live
            .as_ref()
            .ok_or_else(|| ScanError::Browser("browser not running".to_string()))?;
        let page = browser
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScanError::Browser(format!("Failed to create page: {}", e)))?;

        Ok(Box::new(ChromePage { page }))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut live) = self.live.lock().await.take() else {
            return Ok(());
        };

        let closed = live.browser.close().await;
        let _ = live.browser.wait().await;
        live.handler.abort();
        info!("Closed headless browser");

        closed
            .map(|_| ())
            .map_err(|e| ScanError::Browser(format!("Failed to close browser: {}", e)))
    }
}

struct ChromePage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        // goto resolves once the load event has fired
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScanError::Navigation(format!("{}: {}", url, e))),
            Err(_) => Err(ScanError::Timeout(timeout)),
        }
    }

    async fn title(&mut self) -> Result<Option<String>> {
        self.page
            .get_title()
            .await
            .map_err(|e| ScanError::Browser(format!("Failed to read title: {}", e)))
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScanError::Browser(format!("Script evaluation failed: {}", e)))?
            .into_value()
            .map_err(|e| ScanError::ParseError(format!("Script result conversion failed: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| ScanError::Browser(format!("Failed to close page: {}", e)))
    }
}
