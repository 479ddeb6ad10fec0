//! Path-keys and same-origin link filtering.
//!
//! The browser only enumerates anchors (see [`ANCHOR_SCRIPT`]); every decision about
//! which of them become crawlable path-keys is made here so it can be tested without
//! a browser.

use crate::error::{Result, ScanError};
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

/// Language codes whose top-level path segment marks a locale sibling of a page.
pub const DEFAULT_LOCALE_BLOCKLIST: &[&str] = &[
    "de", "es", "fr", "it", "ja", "ko", "nl", "pl", "pt", "ru", "tr", "zh",
];

const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp", "css", "js", "mjs",
    "map", "json", "xml", "txt", "pdf", "zip", "gz", "woff", "woff2", "ttf", "otf", "eot",
    "mp3", "mp4", "webm", "wav", "ogg", "mov", "csv",
];

/// Evaluated in the page; returns every anchor with the attributes the filter needs.
/// `a.href` is already resolved against the document base URL.
pub const ANCHOR_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('a[href]')).map(a => ({
    href: a.href,
    rel: a.getAttribute('rel'),
    hreflang: a.getAttribute('hreflang')
})))()"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathKeyOptions {
    pub include_query: bool,
    pub include_hash: bool,
}

/// An anchor as reported by [`ANCHOR_SCRIPT`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawAnchor {
    pub href: String,
    #[serde(default)]
    pub rel: Option<String>,
    #[serde(default)]
    pub hreflang: Option<String>,
}

impl RawAnchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: None,
            hreflang: None,
        }
    }

    /// `rel="alternate"` and `hreflang` mark locale siblings rather than distinct pages.
    pub fn is_alternate(&self) -> bool {
        let alternate = self
            .rel
            .as_deref()
            .map(|rel| {
                rel.split_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("alternate"))
            })
            .unwrap_or(false);
        alternate || self.hreflang.is_some()
    }
}

/// Build the path-key of an absolute URL.
pub fn path_key(url: &Url, options: PathKeyOptions) -> String {
    build_path_key(url.path(), url.query(), url.fragment(), options)
}

fn build_path_key(
    path: &str,
    query: Option<&str>,
    fragment: Option<&str>,
    options: PathKeyOptions,
) -> String {
    let mut key = if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    if options.include_query
        && let Some(query) = query.filter(|q| !q.is_empty())
    {
        key.push('?');
        key.push_str(query);
    }
    if options.include_hash
        && let Some(fragment) = fragment.filter(|f| !f.is_empty())
    {
        key.push('#');
        key.push_str(fragment);
    }
    key
}

/// The path component of a path-key, without query or fragment.
pub fn key_path(key: &str) -> &str {
    let end = key.find(['?', '#']).unwrap_or(key.len());
    &key[..end]
}

pub fn is_asset_path(path: &str) -> bool {
    let last = key_path(path).rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ASSET_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// API routes and framework internals (`/_next`, `/_nuxt`, ...).
pub fn is_internal_path(path: &str) -> bool {
    path.starts_with("/api/") || path == "/api" || path.starts_with("/_")
}

/// True when the first path segment is a blocklisted locale (`fr`, `FR`, `pt-br` for `pt`).
pub fn is_locale_path<S: AsRef<str>>(path: &str, blocklist: &[S]) -> bool {
    let first = key_path(path)
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if first.is_empty() {
        return false;
    }

    blocklist.iter().any(|entry| {
        let entry = entry.as_ref().trim().to_ascii_lowercase();
        !entry.is_empty()
            && (first == entry
                || first
                    .strip_prefix(entry.as_str())
                    .is_some_and(|rest| rest.starts_with('-')))
    })
}

/// The proxy a crawl is routed through, split into origin and path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBase {
    origin: String,
    prefix: String,
}

impl ProxyBase {
    pub fn parse(proxy_url: &str) -> Result<Self> {
        let url = Url::parse(proxy_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", proxy_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "proxy URL must be http or https: {}",
                proxy_url
            )));
        }
        Ok(Self {
            origin: url.origin().ascii_serialization(),
            prefix: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Where the browser navigates to see `path_key` through the proxy.
    pub fn page_url(&self, path_key: &str) -> String {
        format!("{}{}{}", self.origin, self.prefix, path_key)
    }

    /// Recover the public path-key from a URL served by the proxy, if it is one.
    pub fn strip(&self, url: &Url, options: PathKeyOptions) -> Option<String> {
        if url.origin().ascii_serialization() != self.origin {
            return None;
        }
        let rest = url.path().strip_prefix(self.prefix.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(build_path_key(rest, url.query(), url.fragment(), options))
    }
}

/// Turns the anchors of one page into the ordered, capped list of path-keys to follow.
#[derive(Debug, Clone)]
pub struct LinkFilter<'a> {
    pub origin: &'a str,
    pub proxy: Option<&'a ProxyBase>,
    pub key_options: PathKeyOptions,
    pub locale_blocklist: &'a [String],
    pub max_links: usize,
}

impl LinkFilter<'_> {
    pub fn filter(&self, anchors: &[RawAnchor]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in anchors {
            if anchor.is_alternate() {
                continue;
            }
            let Some(key) = self.resolve(&anchor.href) else {
                continue;
            };
            let path = key_path(&key);
            if is_asset_path(path)
                || is_internal_path(path)
                || is_locale_path(path, self.locale_blocklist)
            {
                continue;
            }
            if seen.insert(key.clone()) {
                links.push(key);
            }
        }

        links.truncate(self.max_links);
        links
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let url = Url::parse(href).ok()?;
        if let Some(proxy) = self.proxy
            && let Some(key) = proxy.strip(&url, self.key_options)
        {
            return Some(key);
        }
        if url.origin().ascii_serialization() == self.origin {
            return Some(path_key(&url, self.key_options));
        }
        None
    }
}
