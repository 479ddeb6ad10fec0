// Best-effort /sitemap.xml probe

use crate::error::{Result, ScanError};
use crate::links::{PathKeyOptions, is_locale_path, path_key};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Fetch `{origin}/sitemap.xml` and return the same-origin, non-locale page URLs it lists.
///
/// Any failure (network, timeout, non-2xx, not a sitemap) yields an empty list; the
/// probe only ever supplements browser discovery.
pub async fn probe_sitemap(
    client: &Client,
    origin: &Url,
    key_options: PathKeyOptions,
    locale_blocklist: &[String],
    timeout: Duration,
) -> Vec<String> {
    let sitemap_url = format!("{}/sitemap.xml", origin.origin().ascii_serialization());
    match fetch_sitemap(client, &sitemap_url, timeout).await {
        Ok(Some(body)) => match extract_locs(&body) {
            Ok(locs) => {
                let urls = same_origin_pages(&locs, origin, key_options, locale_blocklist);
                debug!("Sitemap {} listed {} usable URLs", sitemap_url, urls.len());
                urls
            }
            Err(e) => {
                debug!("Sitemap {} unreadable: {}", sitemap_url, e);
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(e) => {
            debug!("Sitemap probe failed for {}: {}", sitemap_url, e);
            Vec::new()
        }
    }
}

async fn fetch_sitemap(client: &Client, url: &str, timeout: Duration) -> Result<Option<String>> {
    let response = client.get(url).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Ok(None);
    }
    let body = response.text().await?;
    if looks_like_sitemap(&body) {
        Ok(Some(body))
    } else {
        Ok(None)
    }
}

pub fn looks_like_sitemap(body: &str) -> bool {
    body.contains("<urlset") || body.contains("<sitemapindex")
}

/// Every `<loc>` text in document order.
pub fn extract_locs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut inside_loc = false;
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"loc" {
                    inside_loc = true;
                    current.clear();
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"loc" {
                    inside_loc = false;
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locs.push(loc.to_string());
                    }
                }
            }
            Ok(Event::Text(ref e)) if inside_loc => {
                let text = e
                    .unescape()
                    .map_err(|err| ScanError::ParseError(err.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::CData(ref e)) if inside_loc => {
                current.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScanError::ParseError(format!("XML parse error: {}", e))),
            _ => {}
        }
    }

    Ok(locs)
}

fn same_origin_pages(
    locs: &[String],
    origin: &Url,
    key_options: PathKeyOptions,
    locale_blocklist: &[String],
) -> Vec<String> {
    let origin = origin.origin().ascii_serialization();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for loc in locs {
        let Ok(url) = Url::parse(loc) else {
            continue;
        };
        if url.origin().ascii_serialization() != origin {
            continue;
        }
        let key = path_key(&url, key_options);
        if is_locale_path(&key, locale_blocklist) {
            continue;
        }
        let absolute = format!("{}{}", origin, key);
        if seen.insert(absolute.clone()) {
            urls.push(absolute);
        }
    }

    urls
}
