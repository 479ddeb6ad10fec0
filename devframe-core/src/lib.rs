pub mod config;
pub mod crawl;
pub mod error;
pub mod forward;
pub mod graph;
pub mod pattern;
pub mod report;
pub mod security;
pub mod session;

use colored::Colorize;

pub use error::{ProxyError, Result};

pub fn print_banner() {
    let banner = r#"
     _            __
  __| | _____   _/ _|_ __ __ _ _ __ ___   ___
 / _` |/ _ \ \ / / |_| '__/ _` | '_ ` _ \ / _ \
| (_| |  __/\ V /|  _| | | (_| | | | | | |  __/
 \__,_|\___| \_/ |_| |_|  \__,_|_| |_| |_|\___|
"#;
    println!("{}", banner.cyan());
    println!(
        "  {} {}\n",
        "preview authenticated apps in device frames".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
