use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the asset build runner.
#[derive(Parser, Debug)]
#[command(
    name = "assetpipe",
    about = "Dependency-ordered front-end asset build runner",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Report what would be written or transferred without doing it
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Config file (default: assetpipe.toml in the project root)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project root directory
    #[arg(long, global = true, env = "ASSETPIPE_ROOT")]
    pub root: Option<PathBuf>,

    /// Run tasks one at a time (parallel is enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,

    /// Prefix console lines with the local time
    #[arg(long, global = true)]
    pub timestamps: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tasks and their prerequisites
    Run(RunOpts),
    /// Rebuild on file changes until interrupted
    Watch(WatchOpts),
    /// List registered tasks and their execution order
    List,
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn log_name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Watch(_) => "watch",
            Self::List => "list",
            Self::Version => "version",
        }
    }
}

/// Options for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunOpts {
    /// Tasks to run
    #[arg(default_value = "default")]
    pub tasks: Vec<String>,
}

/// Options for the `watch` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct WatchOpts {
    /// Run these tasks once before watching
    #[arg(long, value_delimiter = ',')]
    pub initial: Vec<String>,
}
