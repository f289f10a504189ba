//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cardcache - local card image cache
///
/// Serves card images from a size-bounded disk cache and downloads
/// missing ones from the remote image host at a polite rate.
#[derive(Parser, Debug)]
#[command(name = "cardcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CARDCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Card catalog file (overrides catalog.path)
    #[arg(long, global = true, env = "CARDCACHE_CATALOG")]
    pub catalog: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Get the image for a card, downloading it if needed
    Get(GetArgs),

    /// Download images ahead of time
    Prefetch(PrefetchArgs),

    /// Show cache usage
    Info(InfoArgs),

    /// Delete every cached image
    Clear(ClearArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Card id from the catalog
    pub card_id: String,

    /// Write the image to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the prefetch command
#[derive(Parser, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["card_ids", "all"])))]
pub struct PrefetchArgs {
    /// Card ids to prefetch
    pub card_ids: Vec<String>,

    /// Prefetch every card in the catalog
    #[arg(long)]
    pub all: bool,

    /// Concurrent requests (default: from config)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the info command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for info command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}
