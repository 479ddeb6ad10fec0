// Report generation from crawl results

use crate::graph::PageGraph;
use devframe_scanner::result::CrawlResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
    Dot,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "dot" | "graphviz" => Some(ReportFormat::Dot),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
            ReportFormat::Dot => "dot",
        }
    }
}

pub fn generate_report(result: &CrawlResult, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(result)),
        ReportFormat::Json => generate_json_report(result),
        ReportFormat::Markdown => Ok(generate_markdown_report(result)),
        ReportFormat::Dot => Ok(PageGraph::from_result(result).to_dot()),
    }
}

pub fn generate_text_report(result: &CrawlResult) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                           DEVFRAME PAGE MAP\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Start URL:     {}\n", result.start_url));
    report.push_str(&format!("Pages visited: {}\n", result.pages.len()));
    report.push_str(&format!("Failed pages:  {}\n", result.failed_pages()));
    report.push_str(&format!("Links found:   {}\n", result.total_links()));
    report.push_str(&format!("Sitemap URLs:  {}\n", result.sitemap_urls.len()));
    report.push('\n');

    report.push_str(RULE);
    report.push_str("PAGES\n");
    report.push_str(RULE);
    report.push('\n');

    if result.pages.is_empty() {
        report.push_str("  (none)\n");
    }
    for page in &result.pages {
        let status = if page.is_error() { "✗" } else { "✓" };
        if page.title.is_empty() {
            report.push_str(&format!("{} {}\n", status, page.path));
        } else {
            report.push_str(&format!("{} {}  \"{}\"\n", status, page.path, page.title));
        }
        if let Some(ref error) = page.error {
            report.push_str(&format!("    error: {}\n", error));
        }
        for (i, link) in page.links.iter().enumerate() {
            let prefix = if i == page.links.len() - 1 { "└── " } else { "├── " };
            report.push_str(&format!("    {}{}\n", prefix, link));
        }
    }
    report.push('\n');

    if !result.sitemap_urls.is_empty() {
        report.push_str(RULE);
        report.push_str("SITEMAP\n");
        report.push_str(RULE);
        report.push('\n');
        for url in &result.sitemap_urls {
            let marker = if result.pages.iter().any(|p| &p.url == url) {
                "visited"
            } else {
                "not linked"
            };
            report.push_str(&format!("  {}  [{}]\n", url, marker));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("\nGenerated by devframe\n");
    report
}

pub fn generate_json_report(result: &CrawlResult) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "metadata": {
            "generator": "devframe",
            "version": env!("CARGO_PKG_VERSION"),
            "generatedAt": chrono::Utc::now().to_rfc3339(),
        },
        "summary": {
            "totalPages": result.pages.len(),
            "failedPages": result.failed_pages(),
            "totalLinks": result.total_links(),
            "sitemapUrls": result.sitemap_urls.len(),
        },
        "result": result,
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(result: &CrawlResult) -> String {
    let mut report = String::new();

    report.push_str(&format!("# Page map: {}\n\n", result.start_url));
    report.push_str(&format!(
        "{} pages visited, {} failed, {} links, {} sitemap URLs.\n\n",
        result.pages.len(),
        result.failed_pages(),
        result.total_links(),
        result.sitemap_urls.len()
    ));

    report.push_str("| Path | Title | Links | Status |\n");
    report.push_str("|------|-------|-------|--------|\n");
    for page in &result.pages {
        let status = match page.error {
            Some(ref error) => format!("error: {}", escape_cell(error)),
            None => "ok".to_string(),
        };
        report.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            page.path,
            escape_cell(&page.title),
            page.links.len(),
            status
        ));
    }

    if !result.sitemap_urls.is_empty() {
        report.push_str("\n## Sitemap\n\n");
        for url in &result.sitemap_urls {
            report.push_str(&format!("- {}\n", url));
        }
    }

    report
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
