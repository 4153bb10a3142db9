//! CLI surface: `cache`, `view`, `stats`, `query`

pub mod cache;
pub mod query;
pub mod stats;
pub mod view;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default dataset root, relative to the working directory
pub const DEFAULT_CACHE_PATH: &str = "cache/raw";

#[derive(Debug, Parser)]
#[command(name = "chatvault", version)]
#[command(about = "Cache and query chat workspace messages in Parquet format")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch messages from the workspace and save them to the Parquet cache
    Cache(CacheArgs),
    /// Generate a formatted conversation view from the cache
    View(ViewArgs),
    /// Show cache statistics and partition info
    Stats(StatsArgs),
    /// Query the cache with SQL
    Query(QueryArgs),
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Channel ID(s) to cache (overrides the config file)
    #[arg(short = 'c', long = "channel")]
    pub channels: Vec<String>,

    /// Days to look back
    #[arg(short, long, default_value_t = 2)]
    pub days: i64,

    /// Hours to look back
    #[arg(long, default_value_t = 0)]
    pub hours: i64,

    /// Cache directory
    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// Fetch and cache issue-ticket metadata for mentioned keys
    #[arg(long)]
    pub enrich_tickets: bool,

    /// Partition date for the issue-tickets write, YYYY-MM-DD
    /// (default: today)
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Channel name or raw ID to view
    #[arg(short = 'c', long)]
    pub channel: String,

    /// Date to view, YYYY-MM-DD (default: today)
    #[arg(short, long)]
    pub date: Option<String>,

    /// Start date for a range view, YYYY-MM-DD
    #[arg(long, requires = "end_date", conflicts_with = "date")]
    pub start_date: Option<String>,

    /// End date for a range view, YYYY-MM-DD
    #[arg(long, requires = "start_date", conflicts_with = "date")]
    pub end_date: Option<String>,

    /// Cache directory
    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// Write the view to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Cache directory
    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = StatsFormat::Table)]
    pub format: StatsFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatsFormat {
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// SQL query to run
    #[arg(short, long)]
    pub query: Option<String>,

    /// Interactive SQL mode (REPL)
    #[arg(short, long)]
    pub interactive: bool,

    /// Cache directory
    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = QueryFormat::Table)]
    pub format: QueryFormat,

    /// Limit rows in output
    #[arg(short, long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryFormat {
    Table,
    Json,
    Csv,
}
