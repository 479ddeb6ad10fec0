use devframe::commands::command_argument_builder;
use devframe::handlers::{handle_crawl, handle_serve, init_logging};
use devframe_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    // Global flags are only guaranteed on the subcommand's matches.
    let verbose = chosen_command.get_flag("verbose")
        || chosen_command
            .subcommand()
            .is_some_and(|(_, sub)| sub.get_flag("verbose"));
    init_logging(verbose);

    let outcome = match chosen_command.subcommand() {
        Some(("serve", primary_command)) => handle_serve(primary_command).await,
        Some(("crawl", primary_command)) => handle_crawl(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
