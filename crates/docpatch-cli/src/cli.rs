use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use docpatch_sdk::UpdateMode;

/// Command-line arguments.
#[derive(Parser)]
#[command(
    name = "docpatch",
    about = "Apply patches to document collections, one document at a time",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// How results are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Apply a patch file to a data file
    Apply(ApplyArgs),
    /// Show the difference between two JSON documents
    Diff(DiffArgs),
}

/// Arguments of `apply`.
#[derive(Args)]
pub struct ApplyArgs {
    /// Patch definition: {"version", "collection", "query", "modifier"}
    pub patch: PathBuf,
    /// Collections to load: {"<collection>": [documents]}
    #[arg(long)]
    pub data: PathBuf,
    /// dummy, query, or document
    #[arg(long)]
    pub update: Option<UpdateMode>,
    #[arg(long)]
    pub parallel: Option<usize>,
    /// Record every patch in an audit collection
    #[arg(long)]
    pub log: bool,
    #[arg(long)]
    pub log_collection: Option<String>,
    /// Keep array indices in the accumulated diff
    #[arg(long)]
    pub diff_object: bool,
    /// TOML run options; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Write the resulting collections here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments of `diff`.
#[derive(Args)]
pub struct DiffArgs {
    pub a: PathBuf,
    pub b: PathBuf,
    /// Collapse array indices to [*]
    #[arg(long)]
    pub group: bool,
    /// Per-path counters instead of a labeled tree
    #[arg(long)]
    pub counted: bool,
}
