//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BigCommerce tap CLI
#[derive(Parser, Debug)]
#[command(name = "bigcommerce-tap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Inline config JSON
    #[arg(long, global = true)]
    pub config_json: Option<String>,

    /// State file (JSON), rewritten at every checkpoint
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Verify credentials and print the current rate-limit window
    Check,

    /// List the stream table
    Streams,

    /// Replicate streams to stdout
    Sync {
        /// Streams to sync (comma-separated, empty = all)
        #[arg(long)]
        streams: Option<String>,
    },
}

/// Split a comma-separated stream list, dropping blanks
pub fn parse_stream_list(streams: Option<&str>) -> Vec<String> {
    streams
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
