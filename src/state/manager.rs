//! State manager implementation
//!
//! Provides file-based state persistence with atomic writes.

use super::types::State;
use crate::error::{Error, Result};
use crate::sync::StateStore;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// State manager for persisting and loading bookmarks
#[derive(Debug)]
pub struct StateManager {
    /// Path to the state file
    path: PathBuf,
    /// Current state (cached)
    state: Arc<RwLock<State>>,
    /// Whether to save on every bookmark update
    auto_save: bool,
}

impl StateManager {
    /// Create a new state manager with the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(State::new())),
            auto_save: true,
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(State::new())),
            auto_save: false,
        }
    }

    /// Create a state manager from a file, loading existing state if present
    ///
    /// The file is only rewritten at checkpoints.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
            parse_state(&contents)?
        } else {
            State::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            auto_save: false,
        })
    }

    /// Create a state manager from inline JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(parse_state(json)?)),
            auto_save: false,
        })
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let contents = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?
        };

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    /// Current state as a JSON value
    pub async fn snapshot(&self) -> Result<Value> {
        let state = self.state.read().await;
        serde_json::to_value(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Get the bookmark of `field` for `stream`
    pub async fn get_bookmark(&self, stream: &str, field: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.get_bookmark(stream, field).cloned()
    }

    /// Set the bookmark of `field` for `stream`
    pub async fn set_bookmark(&self, stream: &str, field: &str, value: Value) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.set_bookmark(stream, field, value);
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Persist the state and return it for emission
    pub async fn checkpoint(&self) -> Result<Value> {
        self.save().await?;
        self.snapshot().await
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
            auto_save: self.auto_save,
        }
    }
}

#[async_trait]
impl StateStore for StateManager {
    async fn get_bookmark(&self, stream: &str, field: &str) -> Option<Value> {
        StateManager::get_bookmark(self, stream, field).await
    }

    async fn set_bookmark(&self, stream: &str, field: &str, value: Value) -> Result<()> {
        StateManager::set_bookmark(self, stream, field, value).await
    }

    async fn checkpoint(&self) -> Result<Value> {
        StateManager::checkpoint(self).await
    }
}

fn parse_state(json: &str) -> Result<State> {
    serde_json::from_str(json).map_err(|e| Error::state(format!("Failed to parse state: {e}")))
}
