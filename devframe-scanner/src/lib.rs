pub mod browser;
pub mod crawler;
pub mod error;
pub mod links;
pub mod result;
pub mod sitemap;

pub use browser::{BrowserDriver, BrowserPage, BrowserSettings, ChromeDriver};
pub use crawler::{CrawlOptions, Crawler, CrawlerConfig, ProgressCallback};
pub use error::ScanError;
pub use links::{DEFAULT_LOCALE_BLOCKLIST, PathKeyOptions, ProxyBase};
pub use result::{CrawlResult, PageInfo};
