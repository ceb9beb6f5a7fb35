//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stemmer - Debian rootfs builder
///
/// Builds project root filesystems from platform base images, installing
/// packages inside a chroot with qemu user-mode emulation for foreign
/// architectures.
#[derive(Parser, Debug)]
#[command(name = "stemmer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STEMMER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a project's rootfs and publish it
    Build(BuildArgs),

    /// Discard a project's published rootfs
    Clean(CleanArgs),

    /// List projects and their published builds
    List(ListArgs),

    /// Show configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Project name (directory under the projects path)
    pub project: String,
}

#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Project name
    pub project: String,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Plain,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
