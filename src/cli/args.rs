//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// artcache - local cache for rebuilt Maven artifacts stored in an OCI registry
///
/// Resolves a coordinate to its rebuilt image, extracts the artifact layer
/// once, and serves files from the extracted tree.
#[derive(Parser, Debug)]
#[command(name = "artcache")]
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
    #[arg(short, long, global = true, env = "ARTCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the cache key (registry tag) for a coordinate
    Key(KeyArgs),

    /// Fetch a rebuilt artifact file through the cache
    Get(GetArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the key command
#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Coordinate as group:artifact:version
    pub gav: String,

    /// Key namespace (overrides cache.prepend_tag)
    #[arg(short, long)]
    pub namespace: Option<String>,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Coordinate as group:artifact:version
    pub gav: String,

    /// File name inside the version directory (e.g. bar-1.0.jar)
    pub target: String,

    /// Write the artifact to this file instead of printing a summary
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Registry token (overrides registry.token)
    #[arg(long, env = "ARTCACHE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip the rebuilt artifact check and always ask the registry
    #[arg(long)]
    pub assume_rebuilt: bool,
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
