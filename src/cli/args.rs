//! CLI argument definitions using clap derive

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln - Versioned VM disk-image cache
///
/// Builds and distributes shared disk images across a local cache and
/// SSH-reachable remote repositories, rebuilding only what changed.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
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
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve images: cached, pulled from a remote, or freshly built
    Build(BuildArgs),

    /// List images in the local cache or a remote repository
    List(ListArgs),

    /// Pull the latest version of an image from a remote repository
    Pull(PullArgs),

    /// Push the latest local version of an image to remote repositories
    Push(PushArgs),

    /// Delete old versions of an image from the local cache
    Prune(PruneArgs),

    /// Show or locate the configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Image names to resolve (resolved concurrently)
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Only accept versions built at or after this RFC3339 instant
    #[arg(long, value_name = "RFC3339")]
    pub not_older_than: Option<DateTime<Utc>>,

    /// Copy the resolved artifact to this path (single image only)
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list versions of this image name
    pub name: Option<String>,

    /// List a remote repository instead of the local cache
    #[arg(short, long, value_name = "ID")]
    pub repo: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Arguments for the pull command
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// Image name to pull
    pub name: String,

    /// Pull from this repository only (default: all in pull order)
    #[arg(long, value_name = "ID")]
    pub from: Option<String>,
}

/// Arguments for the push command
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Image name to push
    pub name: String,

    /// Push to this repository only (default: all configured remotes)
    #[arg(long, value_name = "ID")]
    pub to: Option<String>,
}

/// Arguments for the prune command
#[derive(Parser, Debug)]
pub struct PruneArgs {
    /// Image name to prune
    pub name: String,

    /// Versions to keep (default: cache.keep_versions)
    #[arg(short, long)]
    pub keep: Option<usize>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON array
    Json,
    /// One image per line
    Plain,
}
