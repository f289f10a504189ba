//! Cardcache - local card image cache
//!
//! CLI entry point that dispatches to subcommands.

use cardcache::cli::{Cli, Commands};
use cardcache::config::{Config, ConfigManager};
use cardcache::error::CardcacheResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
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

async fn run() -> CardcacheResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let mut config = config_manager.load().await?;
    if let Some(ref catalog) = cli.catalog {
        config.catalog.path = Some(catalog.clone());
    }

    init_logging(cli.verbose, &config);
    cardcache::ui::init_theme();
    debug!("Using config {}", config_manager.path().display());

    // Dispatch to command
    match cli.command {
        Commands::Get(args) => cardcache::cli::commands::get(args, &config).await,
        Commands::Prefetch(args) => cardcache::cli::commands::prefetch(args, &config).await,
        Commands::Info(args) => cardcache::cli::commands::info(args, &config).await,
        Commands::Clear(args) => cardcache::cli::commands::clear(args, &config).await,
        Commands::Config(args) => {
            cardcache::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("cardcache=warn"),
        1 => EnvFilter::new("cardcache=info"),
        _ => EnvFilter::new("cardcache=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
