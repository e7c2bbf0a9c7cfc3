//! CLI argument definitions using clap derive

use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// repocache - per-caller repository working copies with sandboxed analysis
///
/// Clones repositories on demand, keeps one working copy per caller and
/// commit, runs the analysis tool inside it, and evicts idle copies.
#[derive(Parser, Debug)]
#[command(name = "repocache")]
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
    #[arg(short, long, global = true, env = "REPOCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Caller identity owning the working copy (empty = shared anonymous)
    #[arg(long, global = true, env = "REPOCACHE_CALLER", default_value = "")]
    pub caller: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone (or reuse) the working copy for a repository
    Prepare(PrepareArgs),

    /// Run the analysis tool with structured options
    Analyze(AnalyzeArgs),

    /// Run a free-text analysis command
    Run(RunArgs),

    /// Show the report from the last run
    Result(ResultArgs),

    /// List cached working copies
    List(ListArgs),

    /// Evict idle working copies once
    Sweep(SweepArgs),

    /// Run the eviction scheduler until interrupted
    Serve(ServeArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the prepare command
#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// Repository URL (https://github.com/<owner>/<repo>)
    pub url: String,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Repository URL (https://github.com/<owner>/<repo>)
    pub url: String,

    /// Token budget for the generated context
    #[arg(short, long)]
    pub max_tokens: Option<u64>,

    /// Patterns to include (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Patterns to exclude (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["url", "slug"])))]
pub struct RunArgs {
    /// Repository URL (https://github.com/<owner>/<repo>)
    pub url: Option<String>,

    /// Run against an existing working copy instead of a URL
    #[arg(long)]
    pub slug: Option<String>,

    /// Analysis command line, e.g. "ccontext -m 5000"
    #[arg(long = "command", short = 'x', default_value = "")]
    pub command: String,

    /// Print output as line-delimited JSON events while it runs
    #[arg(long, conflicts_with = "slug")]
    pub stream: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the result command
#[derive(Parser, Debug)]
pub struct ResultArgs {
    /// Working copy slug (owner-repo-sha)
    pub slug: String,

    /// Print the PDF report path instead of the markdown report
    #[arg(long)]
    pub pdf: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only show working copies for --caller
    #[arg(long)]
    pub mine: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: ListFormat,
}

/// Arguments for the sweep command
#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Seconds between sweeps (default: from config)
    #[arg(long)]
    pub interval: Option<u64>,
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

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.ttl_secs)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for single results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Text,
    /// JSON output
    Json,
}

/// Output format for the list command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one slug per line)
    Plain,
}
