use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hist",
    about = "Attribute-level change history for structured records",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Diff two record snapshots
    Diff(DiffArgs),
    /// Replay a sequence of snapshots into a version log
    Replay(ReplayArgs),
    /// Print the effective engine configuration
    Config,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Host schema file (TOML)
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Snapshot before the change; omit for a creation diff
    #[arg(long)]
    pub from: Option<PathBuf>,
    /// Snapshot after the change
    #[arg(long)]
    pub to: PathBuf,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Host schema file (TOML)
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Snapshot files in save order; a file may also hold an array of snapshots
    #[arg(required = true)]
    pub snapshots: Vec<PathBuf>,
    /// Also print the reconstructed record at this version number
    #[arg(long)]
    pub at: Option<u64>,
    /// Fold consecutive saves into the open update version instead of
    /// recording one version per save
    #[arg(long)]
    pub merge: bool,
    /// Validate the resulting history
    #[arg(long)]
    pub validate: bool,
}
