//! artcache - rebuilt Maven artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use artcache::cli::{Cli, Commands};
use artcache::config::ConfigManager;
use artcache::error::ArtcacheResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ArtcacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("artcache=warn"),
        1 => EnvFilter::new("artcache=info"),
        _ => EnvFilter::new("artcache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time();
    if config.general.log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Key(args) => artcache::cli::commands::key(args, &config).await,
        Commands::Get(args) => artcache::cli::commands::get(args, &config).await,
        Commands::Config(args) => {
            artcache::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
