use crate::browser::{BrowserDriver, BrowserPage};
use crate::error::{Result, ScanError};
use crate::links::{
    ANCHOR_SCRIPT, DEFAULT_LOCALE_BLOCKLIST, LinkFilter, PathKeyOptions, ProxyBase, RawAnchor,
    path_key,
};
use crate::result::{CrawlResult, PageInfo};
use crate::sitemap::probe_sitemap;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Called after each page visit with the number of pages visited so far and the path-key.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub navigation_timeout: Duration,
    /// Extra wait after load so client-rendered content can paint.
    pub settle_delay: Duration,
    pub sitemap_timeout: Duration,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            sitemap_timeout: Duration::from_secs(5),
            user_agent: format!("devframe/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Per-call crawl options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub depth: usize,
    pub max_links_per_page: usize,
    pub include_query: bool,
    pub include_hash: bool,
    pub locale_blocklist: Vec<String>,
    /// Crawl through the session proxy so its cookies and mocks apply.
    pub proxy_base_url: Option<String>,
}

impl CrawlOptions {
    pub const MAX_DEPTH: usize = 2;
    pub const MAX_LINKS_PER_PAGE: usize = 50;

    /// Clamp `depth` to `[0, 2]` and `max_links_per_page` to `[1, 50]`.
    pub fn clamped(mut self) -> Self {
        self.depth = self.depth.min(Self::MAX_DEPTH);
        self.max_links_per_page = self.max_links_per_page.clamp(1, Self::MAX_LINKS_PER_PAGE);
        self
    }

    pub fn key_options(&self) -> PathKeyOptions {
        PathKeyOptions {
            include_query: self.include_query,
            include_hash: self.include_hash,
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            max_links_per_page: 20,
            include_query: false,
            include_hash: false,
            locale_blocklist: DEFAULT_LOCALE_BLOCKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            proxy_base_url: None,
        }
    }
}

pub struct Crawler {
    driver: Arc<dyn BrowserDriver>,
    client: Client,
    config: CrawlerConfig,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Result<Self> {
        Self::with_config(driver, CrawlerConfig::default())
    }

    pub fn with_config(driver: Arc<dyn BrowserDriver>, config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.sitemap_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            driver,
            client,
            config,
            progress_callback: None,
        })
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Discover the page graph reachable from `start_url`.
    ///
    /// The sitemap probe runs alongside the browser traversal; neither can fail the
    /// crawl once the start URL is valid. Page failures are recorded on the page.
    pub async fn discover(&self, start_url: &str, options: CrawlOptions) -> Result<CrawlResult> {
        let options = options.clamped();
        let start = Url::parse(start_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", start_url, e)))?;
        if !matches!(start.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "only http and https can be crawled: {}",
                start_url
            )));
        }
        let proxy = options
            .proxy_base_url
            .as_deref()
            .map(ProxyBase::parse)
            .transpose()?;

        let origin = start.origin().ascii_serialization();
        let key_options = options.key_options();
        let start_key = path_key(&start, key_options);

        info!(
            "Starting crawl of {} (depth {}, {} links/page{})",
            start_url,
            options.depth,
            options.max_links_per_page,
            if proxy.is_some() { ", via proxy" } else { "" }
        );

        let sitemap = probe_sitemap(
            &self.client,
            &start,
            key_options,
            &options.locale_blocklist,
            self.config.sitemap_timeout,
        );
        let traversal = self.traverse(&origin, start_key, proxy.as_ref(), &options);
        let (sitemap_urls, pages) = tokio::join!(sitemap, traversal);

        let mut result = CrawlResult::new(start_url.to_string());
        result.pages = pages;
        result.sitemap_urls = sitemap_urls;

        info!(
            "Crawl complete. Visited {} pages ({} failed), {} sitemap URLs",
            result.pages.len(),
            result.failed_pages(),
            result.sitemap_urls.len()
        );
        Ok(result)
    }

    /// Depth-first traversal: a page's first link is explored completely before its
    /// second. The visited set is scoped to this call, so no path-key is navigated twice.
    async fn traverse(
        &self,
        origin: &str,
        start_key: String,
        proxy: Option<&ProxyBase>,
        options: &CrawlOptions,
    ) -> Vec<PageInfo> {
        let filter = LinkFilter {
            origin,
            proxy,
            key_options: options.key_options(),
            locale_blocklist: &options.locale_blocklist,
            max_links: options.max_links_per_page,
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut pages = Vec::new();
        let mut stack = vec![(start_key, options.depth)];

        while let Some((key, depth)) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }

            let page = self.visit(origin, &key, proxy, &filter).await;

            if depth > 0 {
                // Reversed so the first link is popped next.
                for link in page.links.iter().rev() {
                    stack.push((link.clone(), depth - 1));
                }
            }
            pages.push(page);

            if let Some(ref callback) = self.progress_callback {
                callback(pages.len(), key);
            }
        }

        pages
    }

    async fn visit(
        &self,
        origin: &str,
        key: &str,
        proxy: Option<&ProxyBase>,
        filter: &LinkFilter<'_>,
    ) -> PageInfo {
        let url = format!("{}{}", origin, key);
        let target = proxy
            .map(|p| p.page_url(key))
            .unwrap_or_else(|| url.clone());
        debug!("Visiting {}", target);

        let mut page = match self.driver.new_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("Could not open a page for {}: {}", target, e);
                return PageInfo::with_error(url, key.to_string(), e.to_string());
            }
        };

        let outcome = self.read_page(&mut *page, &target, filter).await;

        // Tabs are never reused across visits.
        if let Err(e) = page.close().await {
            debug!("Failed to close page for {}: {}", target, e);
        }

        match outcome {
            Ok((title, links)) => PageInfo {
                url,
                path: key.to_string(),
                title,
                links,
                error: None,
            },
            Err(e) => {
                warn!("Crawl error for {}: {}", target, e);
                PageInfo::with_error(url, key.to_string(), e.to_string())
            }
        }
    }

    async fn read_page(
        &self,
        page: &mut dyn BrowserPage,
        target: &str,
        filter: &LinkFilter<'_>,
    ) -> Result<(String, Vec<String>)> {
        page.navigate(target, self.config.navigation_timeout).await?;
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let title = page.title().await?.unwrap_or_default();
        let value = page.evaluate(ANCHOR_SCRIPT).await?;
        let anchors: Vec<RawAnchor> = serde_json::from_value(value)
            .map_err(|e| ScanError::ParseError(format!("Unexpected anchor list: {}", e)))?;

        Ok((title, filter.filter(&anchors)))
    }
}
