//! CLI runner - executes commands

use crate::cli::commands::{parse_stream_list, Cli, Commands};
use crate::client::BigCommerceClient;
use crate::config::TapConfig;
use crate::error::{Error, Result, ResultExt};
use crate::http::HttpSession;
use crate::state::StateManager;
use crate::sync::{JsonLinesSink, StreamSyncer, STREAMS};
use serde_json::{json, Value};
use std::io::{BufWriter, Write};
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Check => self.check().await,
            Commands::Streams => self.streams(),
            Commands::Sync { streams } => self.sync(streams.as_deref()).await,
        }
    }

    /// Load and validate the tap configuration
    fn load_config(&self) -> Result<TapConfig> {
        // Inline config takes precedence
        if let Some(json_str) = &self.cli.config_json {
            return TapConfig::from_json(json_str);
        }

        match &self.cli.config {
            Some(path) => TapConfig::from_file(path),
            None => Err(Error::config(
                "Config not specified (use --config or --config-json)",
            )),
        }
    }

    /// Load state, from inline JSON, a file or nothing
    fn load_state(&self) -> Result<StateManager> {
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    /// Check credentials
    async fn check(&self) -> Result<()> {
        let config = self.load_config()?;
        info!(store = %config.store_hash, "checking connection");

        let session = HttpSession::connect(&config).await?;

        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "status": "SUCCEEDED",
            "store_hash": config.store_hash,
            "rate_limit": session.governor().snapshot(),
        }));
        Ok(())
    }

    /// List streams
    fn streams(&self) -> Result<()> {
        self.output_message(&json!({
            "type": "STREAMS",
            "streams": &STREAMS,
        }));
        Ok(())
    }

    /// Sync streams to stdout
    async fn sync(&self, streams: Option<&str>) -> Result<()> {
        let config = self.load_config()?;
        let state = self.load_state()?;
        let names = parse_stream_list(streams);

        let client = BigCommerceClient::connect(config).await?;
        let mut sink = JsonLinesSink::new(BufWriter::new(std::io::stdout()));

        let stats = StreamSyncer::new(&client, &state)
            .sync_all(&names, &mut sink)
            .await?;

        sink.into_inner()
            .flush()
            .context("Failed to flush output")?;

        info!(
            streams = stats.streams_synced,
            records = stats.records_synced,
            requests = client.session().request_count(),
            "sync finished"
        );
        Ok(())
    }

    /// Output a message to stdout
    fn output_message(&self, msg: &Value) {
        println!("{msg}");
    }
}
