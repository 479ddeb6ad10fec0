use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use devframe_core::config::ServerConfig;
use devframe_core::crawl::{CrawlRequest, execute_crawl};
use devframe_core::report::{ReportFormat, generate_report, save_report};
use devframe_scanner::{BrowserDriver, BrowserSettings, ChromeDriver, CrawlerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use url::Url;

use crate::server::App;

/// Install the fmt subscriber once; later calls are ignored.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok_and(|url| url.host_str().is_some_and(|h| !h.is_empty())) {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

pub fn browser_settings_from(args: &ArgMatches) -> BrowserSettings {
    let mut settings = BrowserSettings {
        headless: !args.get_flag("headful"),
        sandbox: !args.get_flag("no-sandbox"),
        ..BrowserSettings::default()
    };
    if let Some(path) = args.get_one::<String>("chrome") {
        settings = settings.with_executable(path);
    }
    settings
}

pub fn crawler_config_from(args: &ArgMatches) -> CrawlerConfig {
    let defaults = CrawlerConfig::default();
    CrawlerConfig {
        navigation_timeout: args
            .get_one::<u64>("nav-timeout")
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(defaults.navigation_timeout),
        settle_delay: args
            .get_one::<u64>("settle-ms")
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(defaults.settle_delay),
        ..defaults
    }
}

pub fn server_config_from(args: &ArgMatches) -> ServerConfig {
    let defaults = ServerConfig::default();
    let secs = |name: &str, fallback: Duration| {
        args.get_one::<u64>(name)
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(fallback)
    };

    ServerConfig {
        bind: args
            .get_one::<std::net::SocketAddr>("bind")
            .copied()
            .unwrap_or(defaults.bind),
        public_base_url: args.get_one::<String>("public-url").cloned(),
        session_ttl: secs("session-ttl", defaults.session_ttl),
        sweep_interval: secs("sweep-interval", defaults.sweep_interval),
        forward_timeout: secs("forward-timeout", defaults.forward_timeout),
        body_limit: defaults.body_limit,
    }
}

/// Map `crawl` arguments onto the same request shape the HTTP API accepts.
pub fn crawl_request_from(args: &ArgMatches) -> Result<CrawlRequest> {
    let raw = args
        .get_one::<String>("url")
        .context("--url is required")?;
    let Some(url) = parse_url_line(raw) else {
        bail!("'{}' is not a valid URL", raw);
    };

    let locale_prefix_blocklist = if args.get_flag("all-locales") {
        Some(Vec::new())
    } else {
        args.get_many::<String>("locale")
            .map(|codes| codes.cloned().collect())
    };

    Ok(CrawlRequest {
        url: Some(url),
        depth: args.get_one::<i64>("depth").map(|d| *d as f64),
        max_links_per_page: args.get_one::<i64>("max-links").map(|n| *n as f64),
        include_hash: Some(args.get_flag("include-hash")),
        include_query: Some(args.get_flag("include-query")),
        locale_prefix_blocklist,
        proxy_url: args.get_one::<String>("proxy-url").cloned(),
    })
}

pub async fn handle_serve(args: &ArgMatches) -> Result<()> {
    let config = server_config_from(args);
    let bind = config.bind;
    let public_base = config.public_base();

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    let driver: Arc<dyn BrowserDriver> = Arc::new(ChromeDriver::new(browser_settings_from(args)));
    let app = App::init(config, driver, crawler_config_from(args))
        .context("Failed to initialise services")?;

    println!(
        "{} Listening on {}",
        "✓".green().bold(),
        public_base.bright_white()
    );
    info!("API listening on {}", bind);

    app.serve(listener, shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    }
}

pub async fn handle_crawl(args: &ArgMatches) -> Result<()> {
    let request = crawl_request_from(args)?;
    let (start, options) = request
        .into_options(&ServerConfig::default().public_base())
        .context("Invalid crawl target")?;

    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args
        .get_one::<PathBuf>("output")
        .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref()));

    println!("\n🕸️  Mapping {}", start.as_str().bright_white());
    println!("Depth: {}", options.depth);
    println!("Links per page: {}", options.max_links_per_page);
    if let Some(ref proxy) = options.proxy_base_url {
        println!("Via proxy: {}", proxy);
    }
    println!();

    let driver: Arc<dyn BrowserDriver> = Arc::new(ChromeDriver::new(browser_settings_from(args)));
    let outcome = execute_crawl(
        driver.clone(),
        crawler_config_from(args),
        start.as_str(),
        options,
        true,
    )
    .await;

    if let Err(e) = driver.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }
    let result = outcome.context("Crawl failed")?;

    let report = generate_report(&result, format).context("Failed to render report")?;
    match output {
        Some(ref path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "\n{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => {
            println!();
            print!("{}", report);
        }
    }

    Ok(())
}
