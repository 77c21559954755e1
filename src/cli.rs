//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::validator::ValidationMode;

/// Import-graph driven test selection for Python repositories
#[derive(Parser, Debug)]
#[command(name = "pysift")]
#[command(about = "Build a Python import graph and select the tests affected by a change")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands for pysift
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the import graph, optionally saving it to disk
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// Print the test files affected by a set of changed files
    #[command(visible_alias = "s")]
    Select(SelectArgs),

    /// Check a recorded import trace against the static graph
    #[command(visible_alias = "v")]
    Validate(ValidateArgs),
}

/// Arguments for the graph command
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Repository root to scan
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Hook overrides file (JSON)
    #[arg(long, value_name = "FILE")]
    pub hook: Option<PathBuf>,

    /// Write the binary graph to this path
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,

    /// Write a human-readable dump to this path
    #[arg(long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    #[command(flatten)]
    pub build: BuildArgs,
}

/// Arguments for the select command
#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Repository root (used when no saved graph is given, or the saved
    /// graph is stale)
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Load a previously saved graph instead of building one
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,

    /// Hook overrides file (JSON)
    #[arg(long, value_name = "FILE")]
    pub hook: Option<PathBuf>,

    /// Changed file (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Changed module name (repeatable)
    #[arg(long = "module", value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Read additional changed files from stdin, one per line
    #[arg(long)]
    pub stdin: bool,

    #[command(flatten)]
    pub build: BuildArgs,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Repository root (used when no saved graph is given, or the saved
    /// graph is stale)
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Load a previously saved graph instead of building one
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,

    /// Hook overrides file (JSON)
    #[arg(long, value_name = "FILE")]
    pub hook: Option<PathBuf>,

    /// Recorded import trace (JSON lines of importer/imported pairs)
    #[arg(long, value_name = "FILE")]
    pub trace: PathBuf,

    /// Failure policy for missing edges
    #[arg(long, value_enum, default_value = "warn")]
    pub mode: ModeArg,

    #[command(flatten)]
    pub build: BuildArgs,
}

/// Build knobs shared by every subcommand
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Worker threads (default: one per core)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Per-file parse budget in milliseconds (default: unbounded)
    #[arg(long, value_name = "MS")]
    pub parse_timeout_ms: Option<u64>,
}

/// Validator failure policy as exposed on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Strict,
    Warn,
    Disabled,
}

impl From<ModeArg> for ValidationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => ValidationMode::Strict,
            ModeArg::Warn => ValidationMode::Warn,
            ModeArg::Disabled => ValidationMode::Disabled,
        }
    }
}
