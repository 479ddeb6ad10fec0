use crate::CLAP_STYLING;
use clap::{arg, command};

/// Browser and page-load options shared by `serve` and `crawl`.
fn browser_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(--"chrome" <PATH>)
            .required(false)
            .help("Path to the Chromium/Chrome executable (default: auto-detect)"),
    )
    .arg(
        arg!(--"headful")
            .required(false)
            .help("Show the browser window instead of running headless")
            .action(clap::ArgAction::SetTrue),
    )
    .arg(
        arg!(--"no-sandbox")
            .required(false)
            .help("Disable the Chromium sandbox (needed in some containers)")
            .action(clap::ArgAction::SetTrue),
    )
    .arg(
        arg!(--"nav-timeout" <SECONDS>)
            .required(false)
            .help("Per-page navigation timeout in seconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("30"),
    )
    .arg(
        arg!(--"settle-ms" <MILLIS>)
            .required(false)
            .help("Extra wait after page load for client-rendered content")
            .value_parser(clap::value_parser!(u64))
            .default_value("3000"),
    )
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("devframe")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("devframe")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(browser_args(
            command!("serve")
                .about("Run the session proxy and crawl API")
                .arg(
                    arg!(-b --"bind" <ADDR>)
                        .required(false)
                        .help("Address to listen on")
                        .value_parser(clap::value_parser!(std::net::SocketAddr))
                        .default_value(devframe_core::config::DEFAULT_BIND),
                )
                .arg(
                    arg!(--"public-url" <URL>)
                        .required(false)
                        .help("Externally visible base URL of this server (default: http://<bind>)"),
                )
                .arg(
                    arg!(--"session-ttl" <SECONDS>)
                        .required(false)
                        .help("Seconds before an idle session is expired")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("3600"),
                )
                .arg(
                    arg!(--"sweep-interval" <SECONDS>)
                        .required(false)
                        .help("Seconds between expiry sweeps")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("600"),
                )
                .arg(
                    arg!(--"forward-timeout" <SECONDS>)
                        .required(false)
                        .help("Timeout for each proxied upstream request")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                ),
        ))
        .subcommand(browser_args(
            command!("crawl")
                .about("Map the pages of a site with a headless browser")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start crawling from"),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Link depth to follow from the start page (0-2)")
                        .value_parser(clap::value_parser!(i64))
                        .default_value("1"),
                )
                .arg(
                    arg!(--"max-links" <NUM>)
                        .required(false)
                        .help("Links kept per page (1-50)")
                        .value_parser(clap::value_parser!(i64))
                        .default_value("20"),
                )
                .arg(
                    arg!(--"include-query")
                        .required(false)
                        .help("Treat URLs differing only in query string as distinct pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"include-hash")
                        .required(false)
                        .help("Treat URLs differing only in fragment as distinct pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"locale" <CODE>)
                        .required(false)
                        .help("Locale path prefix to skip; repeatable (default: common languages)")
                        .action(clap::ArgAction::Append)
                        .conflicts_with("all-locales"),
                )
                .arg(
                    arg!(--"all-locales")
                        .required(false)
                        .help("Do not skip any locale-prefixed paths")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"proxy-url" <URL>)
                        .required(false)
                        .help("Crawl through a devframe session, e.g. http://127.0.0.1:4000/proxy/<id>"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown, dot")
                        .value_parser(["text", "json", "markdown", "dot"])
                        .default_value("text"),
                ),
        ))
}
