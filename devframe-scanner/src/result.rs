use serde::{Deserialize, Serialize};

/// One visited page of a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Absolute URL on the real origin (never the proxy URL).
    pub url: String,
    /// Origin-relative key used for dedup; always starts with `/`.
    pub path: String,
    pub title: String,
    /// Same-origin path-keys in document order, deduplicated and capped.
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageInfo {
    pub fn new(url: String, path: String) -> Self {
        Self {
            url,
            path,
            title: String::new(),
            links: Vec::new(),
            error: None,
        }
    }

    pub fn with_error(url: String, path: String, error: String) -> Self {
        Self {
            url,
            path,
            title: String::new(),
            links: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub start_url: String,
    pub pages: Vec<PageInfo>,
    pub sitemap_urls: Vec<String>,
}

impl CrawlResult {
    pub fn new(start_url: String) -> Self {
        Self {
            start_url,
            pages: Vec::new(),
            sitemap_urls: Vec::new(),
        }
    }

    pub fn page(&self, path: &str) -> Option<&PageInfo> {
        self.pages.iter().find(|p| p.path == path)
    }

    pub fn total_links(&self) -> usize {
        self.pages.iter().map(|p| p.links.len()).sum()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_error()).count()
    }
}
