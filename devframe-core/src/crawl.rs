use crate::error::Result;
use crate::security::validate_target_url;
use devframe_scanner::result::CrawlResult;
use devframe_scanner::{BrowserDriver, CrawlOptions, Crawler, CrawlerConfig, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Body of `POST /crawl`. Missing fields take the crawler defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// Any JSON number; fractions are truncated before clamping.
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub max_links_per_page: Option<f64>,
    #[serde(default)]
    pub include_hash: Option<bool>,
    #[serde(default)]
    pub include_query: Option<bool>,
    #[serde(default)]
    pub locale_prefix_blocklist: Option<Vec<String>>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl CrawlRequest {
    /// Validate the target and build clamped crawl options.
    ///
    /// A `proxyUrl` starting with `/` is resolved against `public_base`.
    pub fn into_options(self, public_base: &str) -> Result<(Url, CrawlOptions)> {
        let start = validate_target_url(self.url.as_deref().unwrap_or_default())?;

        let proxy_base_url = match self.proxy_url.as_deref().map(str::trim) {
            Some(proxy) if proxy.starts_with('/') => {
                let absolute = format!("{}{}", public_base.trim_end_matches('/'), proxy);
                Some(validate_target_url(&absolute)?.to_string())
            }
            Some(proxy) if !proxy.is_empty() => Some(validate_target_url(proxy)?.to_string()),
            _ => None,
        };

        let defaults = CrawlOptions::default();
        let options = CrawlOptions {
            depth: self
                .depth
                .map(|d| clamp_count(d, 0, CrawlOptions::MAX_DEPTH))
                .unwrap_or(defaults.depth),
            max_links_per_page: self
                .max_links_per_page
                .map(|n| clamp_count(n, 1, CrawlOptions::MAX_LINKS_PER_PAGE))
                .unwrap_or(defaults.max_links_per_page),
            include_query: self.include_query.unwrap_or(false),
            include_hash: self.include_hash.unwrap_or(false),
            locale_blocklist: self
                .locale_prefix_blocklist
                .unwrap_or(defaults.locale_blocklist),
            proxy_base_url,
        };

        Ok((start, options))
    }
}

fn clamp_count(value: f64, min: usize, max: usize) -> usize {
    if value.is_nan() {
        return min;
    }
    value.trunc().clamp(min as f64, max as f64) as usize
}

/// Origin-relative part of a URL: path plus any query and fragment.
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let mut path = if u.path().is_empty() {
                "/".to_string()
            } else {
                u.path().to_string()
            };
            if let Some(query) = u.query() {
                path.push('?');
                path.push_str(query);
            }
            if let Some(fragment) = u.fragment() {
                path.push('#');
                path.push_str(fragment);
            }
            path
        })
        .unwrap_or_else(|| url.to_string())
}

/// Run one crawl outside the HTTP API, optionally with a terminal spinner.
pub async fn execute_crawl(
    driver: Arc<dyn BrowserDriver>,
    config: CrawlerConfig,
    start_url: &str,
    options: CrawlOptions,
    show_progress: bool,
) -> Result<CrawlResult> {
    let progress_bar = if show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Opening {}...", start_url));
        Some(pb)
    } else {
        None
    };

    let mut crawler = Crawler::with_config(driver, config)?;
    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        let page_callback: ProgressCallback = Arc::new(move |count: usize, path: String| {
            pb.set_message(format!("Crawling... {} pages visited ({})", count, path));
        });
        crawler = crawler.with_progress_callback(page_callback);
    }

    let outcome = crawler.discover(start_url, options).await;

    if let Some(ref pb) = progress_bar {
        match outcome {
            Ok(ref result) => pb.finish_with_message(format!(
                "Crawl complete! {} pages visited, {} sitemap URLs",
                result.pages.len(),
                result.sitemap_urls.len()
            )),
            Err(ref e) => pb.abandon_with_message(format!("Crawl failed: {}", e)),
        }
    }

    Ok(outcome?)
}
