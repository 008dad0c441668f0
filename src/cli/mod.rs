//! CLI module
//!
//! Command-line interface for running the tap.
//!
//! # Commands
//!
//! - `check` - Verify credentials against the store
//! - `streams` - List the stream table
//! - `sync` - Replicate streams as JSON lines on stdout

mod commands;
mod runner;

pub use commands::{parse_stream_list, Cli, Commands};
pub use runner::Runner;
