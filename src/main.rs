//! Stemmer - Debian rootfs builder
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stemmer::cli::{Cli, Commands};
use stemmer::config::ConfigManager;
use stemmer::error::StemmerResult;
use tracing::debug;
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

async fn run() -> StemmerResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn (progress only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("stemmer=warn"),
        1 => EnvFilter::new("stemmer=info"),
        _ => EnvFilter::new("stemmer=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time();
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => stemmer::cli::commands::build(args, &config).await,
        Commands::Clean(args) => stemmer::cli::commands::clean(args, &config).await,
        Commands::List(args) => stemmer::cli::commands::list(args, &config).await,
        Commands::Config(args) => {
            stemmer::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
