//! Command-line interface definitions for trellis.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Incremental build runner for trellis.toml projects.
#[derive(Parser)]
#[command(name = "trellis", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Recipe file to use instead of searching for trellis.toml.
    #[arg(long, short = 'f', global = true)]
    pub file: Option<PathBuf>,

    /// Journal file (relative to the project root).
    #[arg(long, global = true, conflicts_with = "no_journal")]
    pub journal: Option<PathBuf>,

    /// Build without reading or writing the journal.
    #[arg(long, global = true)]
    pub no_journal: bool,

    /// Show only errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also show skipped goals, staleness reasons, and timings.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Maximum number of concurrent recipes (0 or omitted = one per CPU).
    #[arg(long, short = 'j', global = true)]
    pub jobs: Option<usize>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Build goals (default: `default`).
    Build(BuildArgs),
    /// Delete the journal, forcing a full rebuild next time.
    Clean,
    /// Print the declared goals.
    List,
}

/// Arguments for the `build` subcommand.
#[derive(Parser)]
pub struct BuildArgs {
    /// Goals to build.
    pub goals: Vec<String>,
}
